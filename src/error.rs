//! Error types for the MySQL MCP bridge

use std::fmt;
use tracing::{error, warn};

/// Result type alias for the bridge
pub type Result<T> = std::result::Result<T, ServerError>;

/// Main error type for the MySQL MCP bridge
///
/// Variants correspond to the error kinds reported to protocol clients.
/// The mapping to JSON-RPC error codes happens at the server boundary only.
#[derive(Debug)]
pub enum ServerError {
    /// Bad or missing tool arguments, failed connection attempts,
    /// and query execution failures
    InvalidParams {
        /// User-facing error message
        message: String,
        /// The underlying database error, if any
        source: Option<sqlx::Error>,
    },
    /// Operation attempted without an active connection and with no
    /// usable default configuration
    InvalidRequest {
        /// User-facing error message
        message: String,
    },
    /// Unknown JSON-RPC method or unknown tool name
    MethodNotFound {
        /// The method or tool name that was not recognized
        method: String,
    },
    /// Introspection failures and other server-side errors
    Internal {
        /// User-facing error message
        message: String,
        /// The underlying database error, if any
        source: Option<sqlx::Error>,
    },
    /// Serialization/deserialization errors
    Serialization {
        /// The underlying serialization error
        source: serde_json::Error,
        /// Context about what was being serialized
        context: String,
    },
    /// Startup configuration errors
    Configuration {
        /// Configuration parameter that is invalid
        parameter: String,
        /// Error message
        message: String,
    },
}

impl ServerError {
    /// Create an invalid-params error for bad tool arguments
    pub fn invalid_params(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!("Invalid params: {}", message);

        Self::InvalidParams {
            message,
            source: None,
        }
    }

    /// Create an invalid-params error for a failed connection attempt
    pub fn connect_failed(source: sqlx::Error) -> Self {
        let message = format!(
            "Failed to connect to MySQL database: {}",
            Self::sanitize_database_error(&source)
        );
        error!("Connection attempt failed: {}", source);

        Self::InvalidParams {
            message,
            source: Some(source),
        }
    }

    /// Create an invalid-params error for a failed query execution
    pub fn query_failed(sql: &str, source: sqlx::Error) -> Self {
        error!("Query execution failed: {} | SQL: {}", source, sql);

        Self::InvalidParams {
            message: format!(
                "Query execution failed: {}",
                Self::sanitize_database_error(&source)
            ),
            source: Some(source),
        }
    }

    /// Create an invalid-request error for operations that need a connection
    pub fn not_connected() -> Self {
        warn!("Operation attempted without an active database connection");

        Self::InvalidRequest {
            message: "Not connected to a MySQL database. Call the connect tool first, \
                      or configure default credentials for auto-connect."
                .to_string(),
        }
    }

    /// Create a method-not-found error for an unknown method or tool
    pub fn method_not_found(method: impl Into<String>) -> Self {
        let method = method.into();
        warn!("Unknown method or tool: {}", method);

        Self::MethodNotFound { method }
    }

    /// Create an internal error for a failed introspection statement
    pub fn introspection_failed(operation: &str, source: sqlx::Error) -> Self {
        error!("Introspection failed during {}: {}", operation, source);

        Self::Internal {
            message: format!(
                "{} failed: {}",
                operation,
                Self::sanitize_database_error(&source)
            ),
            source: Some(source),
        }
    }

    /// Create a general internal error
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        error!("Internal server error: {}", message);

        Self::Internal {
            message,
            source: None,
        }
    }

    /// Create a serialization error
    pub fn serialization_error(source: serde_json::Error, context: impl Into<String>) -> Self {
        let context = context.into();
        error!("Serialization error in {}: {}", context, source);

        Self::Serialization { source, context }
    }

    /// Create a configuration error
    pub fn configuration_error(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        let parameter = parameter.into();
        let message = message.into();
        error!("Configuration error for '{}': {}", parameter, message);

        Self::Configuration { parameter, message }
    }

    /// Get a user-friendly error message (safe to send to clients)
    pub fn user_message(&self) -> String {
        match self {
            ServerError::InvalidParams { message, .. } => message.clone(),
            ServerError::InvalidRequest { message } => message.clone(),
            ServerError::MethodNotFound { method } => {
                format!("Unknown method or tool: {}", method)
            }
            ServerError::Internal { message, .. } => message.clone(),
            ServerError::Serialization { context, .. } => {
                format!("Data serialization error in {}", context)
            }
            ServerError::Configuration { parameter, message } => {
                format!("Configuration error for '{}': {}", parameter, message)
            }
        }
    }

    /// Get detailed error information for logging
    pub fn detailed_message(&self) -> String {
        match self {
            ServerError::InvalidParams { message, source } => {
                format!("Invalid params: {} | Source: {:?}", message, source)
            }
            ServerError::InvalidRequest { message } => {
                format!("Invalid request: {}", message)
            }
            ServerError::MethodNotFound { method } => {
                format!("Method not found: {}", method)
            }
            ServerError::Internal { message, source } => {
                format!("Internal error: {} | Source: {:?}", message, source)
            }
            ServerError::Serialization { source, context } => {
                format!("Serialization error in {}: {}", context, source)
            }
            ServerError::Configuration { parameter, message } => {
                format!("Configuration error for '{}': {}", parameter, message)
            }
        }
    }

    /// Sanitize database error messages to remove sensitive information
    fn sanitize_database_error(source: &sqlx::Error) -> String {
        let sanitized = source
            .to_string()
            .replace("password=", "password=[REDACTED]")
            .replace("pwd=", "pwd=[REDACTED]");

        // Clamp length to keep protocol responses and logs readable
        if sanitized.len() > 500 {
            let clipped: String = sanitized.chars().take(497).collect();
            format!("{}...", clipped)
        } else {
            sanitized
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::InvalidParams { source, .. } => source
                .as_ref()
                .map(|e| e as &(dyn std::error::Error + 'static)),
            ServerError::Internal { source, .. } => source
                .as_ref()
                .map(|e| e as &(dyn std::error::Error + 'static)),
            ServerError::Serialization { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::serialization_error(err, "unknown context")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_connected_is_invalid_request() {
        let err = ServerError::not_connected();
        assert!(matches!(err, ServerError::InvalidRequest { .. }));
        assert!(err.user_message().contains("Not connected"));
    }

    #[test]
    fn test_method_not_found_names_the_method() {
        let err = ServerError::method_not_found("bogus_tool");
        assert_eq!(err.user_message(), "Unknown method or tool: bogus_tool");
    }

    #[test]
    fn test_query_failure_carries_driver_message() {
        let driver = sqlx::Error::Protocol("syntax error near 'SELCT'".to_string());
        let err = ServerError::query_failed("SELCT 1", driver);

        assert!(matches!(err, ServerError::InvalidParams { .. }));
        assert!(err.user_message().contains("SELCT"));
    }

    #[test]
    fn test_sanitize_redacts_password_fragments() {
        let driver = sqlx::Error::Protocol("bad option password=hunter2".to_string());
        let err = ServerError::connect_failed(driver);

        let message = err.user_message();
        assert!(!message.contains("hunter2"));
        assert!(message.contains("[REDACTED]"));
    }

    #[test]
    fn test_sanitize_clamps_long_messages() {
        let driver = sqlx::Error::Protocol("x".repeat(2000));
        let err = ServerError::query_failed("SELECT 1", driver);

        assert!(err.user_message().len() < 600);
        assert!(err.user_message().ends_with("..."));
    }
}
