//! Database connection management
//!
//! The connection manager holds at most one active pool, the configuration
//! that opened it, and the remembered default configuration used for
//! auto-connect.

use crate::config::ConnectionSettings;
use crate::{Result, ServerError};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlSslMode};
use sqlx::Connection;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pool acquire timeout; the only timeout layer beyond what sqlx enforces.
/// Also bounds a failed connect, since the pool retries refused connections
/// until this deadline.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Manager for the single active MySQL connection pool
pub struct ConnectionManager {
    pool: Option<MySqlPool>,
    current: Option<ConnectionSettings>,
    default: Option<ConnectionSettings>,
    auto_connect: bool,
}

impl ConnectionManager {
    /// Create a new, disconnected connection manager
    pub fn new() -> Self {
        Self {
            pool: None,
            current: None,
            default: None,
            auto_connect: false,
        }
    }

    /// Create a manager with a default configuration and auto-connect enabled
    pub fn with_default(settings: ConnectionSettings) -> Self {
        Self {
            pool: None,
            current: None,
            default: Some(settings),
            auto_connect: true,
        }
    }

    /// Check if a pool is currently active
    pub fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    /// Check if auto-connect is enabled
    pub fn auto_connect_enabled(&self) -> bool {
        self.auto_connect
    }

    /// Get the configuration of the active pool, if connected
    pub fn current_settings(&self) -> Option<&ConnectionSettings> {
        self.current.as_ref()
    }

    /// Open a new pool from the given settings
    ///
    /// Any existing pool is closed first, so a reconnect never leaks the
    /// previous pool. The new pool is only stored after a liveness check
    /// (acquire one connection, ping, release) succeeds.
    pub async fn connect(&mut self, settings: ConnectionSettings) -> Result<()> {
        settings.validate()?;

        if let Some(old_pool) = self.pool.take() {
            info!("Closing existing connection pool before reconnecting");
            old_pool.close().await;
        }
        self.current = None;

        debug!("Opening connection pool for {}", settings.masked_summary());

        let mut options = MySqlConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .ssl_mode(if settings.ssl {
                MySqlSslMode::Required
            } else {
                MySqlSslMode::Disabled
            });

        if let Some(database) = &settings.database {
            options = options.database(database);
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(settings.connection_limit)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy_with(options);

        // Liveness check before declaring the pool usable
        match pool.acquire().await {
            Ok(mut conn) => {
                if let Err(e) = conn.ping().await {
                    drop(conn);
                    pool.close().await;
                    return Err(ServerError::connect_failed(e));
                }
            }
            Err(e) => {
                pool.close().await;
                return Err(ServerError::connect_failed(e));
            }
        }

        info!("Connected to {}", settings.masked_summary());
        self.pool = Some(pool);
        self.current = Some(settings);
        Ok(())
    }

    /// Connect and remember the settings as the default for auto-connect
    pub async fn setup_persistent(&mut self, settings: ConnectionSettings) -> Result<()> {
        self.connect(settings.clone()).await?;

        self.default = Some(settings);
        self.auto_connect = true;
        info!("Stored default connection configuration, auto-connect enabled");
        Ok(())
    }

    /// Get the active pool, auto-connecting first if possible
    ///
    /// A failed auto-connect is logged and leaves the manager disconnected,
    /// so a later operation can retry; the caller then sees the same
    /// not-connected failure as without a default configuration.
    pub async fn ensure_connected(&mut self) -> Result<&MySqlPool> {
        if self.pool.is_none() && self.auto_connect {
            if let Some(default) = self.default.clone() {
                info!(
                    "Auto-connecting with default configuration {}",
                    default.masked_summary()
                );
                if let Err(e) = self.connect(default).await {
                    warn!("Auto-connect failed: {}", e.user_message());
                }
            }
        }

        self.pool.as_ref().ok_or_else(ServerError::not_connected)
    }

    /// Close the pool and clear the active connection state
    ///
    /// Idempotent; the default configuration and auto-connect flag survive
    /// so a later operation can reconnect automatically.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            info!("Closing connection pool");
            pool.close().await;
        } else {
            debug!("Disconnect requested with no active pool");
        }

        self.current = None;
        Ok(())
    }

    /// Build a multi-line status report, including a live health check
    ///
    /// Never fails: health-check problems are reported inside the text.
    pub async fn status_report(&self) -> String {
        let mut lines = vec!["MySQL Connection Status".to_string()];

        lines.push(format!(
            "  Connected: {}",
            if self.pool.is_some() { "yes" } else { "no" }
        ));
        lines.push(format!(
            "  Auto-connect: {}",
            if self.auto_connect { "enabled" } else { "disabled" }
        ));

        if let (Some(pool), Some(settings)) = (&self.pool, &self.current) {
            lines.push(format!("  Host: {}", settings.host));
            lines.push(format!("  Port: {}", settings.port));
            lines.push(format!(
                "  Database: {}",
                settings.database.as_deref().unwrap_or("(none)")
            ));
            lines.push(format!("  User: {}", settings.user));

            let started = Instant::now();
            let health = match pool.acquire().await {
                Ok(mut conn) => match conn.ping().await {
                    Ok(()) => format!("ok ({}ms)", started.elapsed().as_millis()),
                    Err(e) => format!("failed ({})", e),
                },
                Err(e) => format!("failed ({})", e),
            };
            lines.push(format!("  Health check: {}", health));
        }

        lines.join("\n")
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
