use mysql_mcp_bridge::config::Config;
use mysql_mcp_bridge::connection::ConnectionManager;
use mysql_mcp_bridge::server::McpServer;
use mysql_mcp_bridge::Result;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first to get the log level
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            // Initialize basic tracing for error reporting
            tracing_subscriber::fmt::init();
            error!("Failed to load configuration: {}", e.user_message());
            error!("Configuration error details: {}", e.detailed_message());
            return Err(e);
        }
    };

    // Initialize tracing with the configured log level
    let log_level = match config.server.log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .init();

    info!("Starting MySQL MCP bridge");
    info!("Log level set to: {}", config.server.log_level);
    info!("Server will listen on port: {}", config.server.port);

    let manager = match &config.connection {
        Some(settings) => {
            info!(
                "Default connection configured: {}",
                settings.masked_summary()
            );
            ConnectionManager::with_default(settings.clone())
        }
        None => {
            info!("No default connection configured; waiting for connect tool");
            ConnectionManager::new()
        }
    };

    let server = McpServer::new(manager);

    // Establish the default connection eagerly; failure is not fatal
    server.auto_connect_on_startup().await;

    // Set up graceful shutdown handling
    let shutdown_signal = setup_shutdown_signal();

    let server_for_shutdown = server.clone();

    tokio::select! {
        result = server.start(config.server.port) => {
            match result {
                Ok(_) => {
                    info!("Server stopped normally");
                    Ok(())
                }
                Err(e) => {
                    error!("Server failed: {}", e.user_message());
                    error!("Server error details: {}", e.detailed_message());
                    Err(e)
                }
            }
        }
        _ = shutdown_signal => {
            info!("Shutdown signal received, stopping server gracefully");

            if let Err(e) = server_for_shutdown.shutdown().await {
                error!("Error during graceful shutdown: {}", e.user_message());
                // Continue with shutdown even if there are errors
            }

            info!("Server shutdown complete");
            Ok(())
        }
    }
}

/// Set up graceful shutdown signal handling
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
