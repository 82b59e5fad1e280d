//! MCP server implementation

use crate::config::ConnectionSettings;
use crate::connection::ConnectionManager;
use crate::query::{self, QueryRequest};
use crate::{introspect, Result, ServerError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// JSON-RPC request structure
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

/// JSON-RPC response structure
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error structure
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// MCP server exposing MySQL operations as tools
#[derive(Clone)]
pub struct McpServer {
    manager: Arc<Mutex<ConnectionManager>>,
}

impl McpServer {
    /// Create a new MCP server around a connection manager
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager: Arc::new(Mutex::new(manager)),
        }
    }

    /// Attempt the startup auto-connect if a default configuration exists
    ///
    /// Failure is logged and leaves the manager disconnected; the first
    /// tool invocation will retry.
    pub async fn auto_connect_on_startup(&self) {
        let mut manager = self.manager.lock().await;
        if !manager.auto_connect_enabled() {
            return;
        }

        match manager.ensure_connected().await {
            Ok(_) => info!("Startup auto-connect succeeded"),
            Err(e) => warn!("Startup auto-connect failed: {}", e.user_message()),
        }
    }

    /// Start the MCP server with HTTP transport
    pub async fn start(&self, port: u16) -> Result<()> {
        use warp::Filter;

        let server = self.clone();

        let server_for_mcp = server.clone();
        let mcp_route = warp::path("mcp")
            .and(warp::post())
            .and(warp::body::json())
            .and_then(move |request: JsonRpcRequest| {
                let server = server_for_mcp.clone();
                async move {
                    let is_notification =
                        request.method.starts_with("notifications/") && request.id.is_none();

                    let response = server.handle_jsonrpc_request(request).await;

                    if is_notification {
                        Ok::<_, warp::Rejection>(warp::reply::with_status(
                            warp::reply::json(&json!({})),
                            warp::http::StatusCode::NO_CONTENT,
                        ))
                    } else {
                        Ok(warp::reply::with_status(
                            warp::reply::json(&response),
                            warp::http::StatusCode::OK,
                        ))
                    }
                }
            });

        // Some clients probe the endpoint with GET before posting requests
        let mcp_get_route = warp::path("mcp").and(warp::get()).and_then(|| async {
            let response = json!({
                "jsonrpc": "2.0",
                "result": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {
                        "tools": {}
                    },
                    "serverInfo": {
                        "name": "mysql-mcp-bridge",
                        "version": "0.1.0"
                    }
                }
            });
            Ok::<_, warp::Rejection>(warp::reply::json(&response))
        });

        let mcp_options = warp::path("mcp")
            .and(warp::options())
            .map(|| warp::reply::with_status("", warp::http::StatusCode::OK));

        let cors = warp::cors()
            .allow_any_origin()
            .allow_headers(vec![
                "content-type",
                "authorization",
                "x-requested-with",
                "accept",
            ])
            .allow_methods(vec!["POST", "GET", "OPTIONS"])
            .expose_headers(vec!["content-type"]);

        let routes = mcp_route.or(mcp_get_route).or(mcp_options).with(cors);

        info!("MCP server listening on http://0.0.0.0:{}/mcp", port);

        warp::serve(routes).run(([0, 0, 0, 0], port)).await;

        info!("Server stopped");
        Ok(())
    }

    /// Shutdown the server gracefully, closing the connection pool
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down MCP server");

        let mut manager = self.manager.lock().await;
        manager.disconnect().await?;

        info!("MCP server shutdown complete");
        Ok(())
    }

    /// Handle JSON-RPC requests
    pub async fn handle_jsonrpc_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!(
            "Handling JSON-RPC request: method={}, id={:?}",
            request.method, request.id
        );

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "notifications/initialized" => Ok(json!({})),
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_call_tool(request.params).await,
            other => Err(ServerError::method_not_found(other)),
        };

        match result {
            Ok(result_value) => JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: Some(result_value),
                error: None,
            },
            Err(e) => {
                error!("JSON-RPC request failed: {}", e.detailed_message());

                // Error kind to protocol code mapping happens here only
                let error_code = match &e {
                    ServerError::InvalidParams { .. } => -32602,
                    ServerError::InvalidRequest { .. } => -32600,
                    ServerError::MethodNotFound { .. } => -32601,
                    _ => -32603,
                };

                JsonRpcResponse {
                    jsonrpc: "2.0".to_string(),
                    id: request.id,
                    result: None,
                    error: Some(JsonRpcError {
                        code: error_code,
                        message: e.user_message(),
                        data: None,
                    }),
                }
            }
        }
    }

    /// Handle initialize request
    pub async fn handle_initialize(&self, _params: Option<Value>) -> Result<Value> {
        info!("Handling initialize request");

        Ok(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": "mysql-mcp-bridge",
                "version": "0.1.0"
            }
        }))
    }

    /// Handle list tools request
    pub async fn handle_list_tools(&self) -> Result<Value> {
        debug!("Handling list tools request");

        Ok(json!({
            "tools": [
                {
                    "name": "connect",
                    "description": "Connect to a MySQL database. Closes any existing connection first.",
                    "inputSchema": {
                        "type": "object",
                        "properties": connection_properties(),
                        "required": ["user", "password"]
                    }
                },
                {
                    "name": "query",
                    "description": "Execute a SQL statement with optional positional parameters. Row-returning statements yield rows as JSON; writes report affected rows.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "sql": {
                                "type": "string",
                                "description": "SQL statement with ? placeholders"
                            },
                            "params": {
                                "type": "array",
                                "description": "Positional parameter values, bound in order",
                                "items": {}
                            }
                        },
                        "required": ["sql"]
                    }
                },
                {
                    "name": "list_databases",
                    "description": "List all databases visible to the connected user",
                    "inputSchema": {
                        "type": "object",
                        "properties": {}
                    }
                },
                {
                    "name": "list_tables",
                    "description": "List all tables in a database",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "database": {
                                "type": "string",
                                "description": "Database name (optional, uses current database if not specified)"
                            }
                        }
                    }
                },
                {
                    "name": "describe_table",
                    "description": "Get the column structure of a table",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "table": {
                                "type": "string",
                                "description": "Table name"
                            },
                            "database": {
                                "type": "string",
                                "description": "Database name (optional, uses current database if not specified)"
                            }
                        },
                        "required": ["table"]
                    }
                },
                {
                    "name": "disconnect",
                    "description": "Close the active database connection",
                    "inputSchema": {
                        "type": "object",
                        "properties": {}
                    }
                },
                {
                    "name": "setup_persistent",
                    "description": "Connect and store the configuration as the default, enabling automatic reconnection for later operations.",
                    "inputSchema": {
                        "type": "object",
                        "properties": connection_properties(),
                        "required": ["user", "password"]
                    }
                },
                {
                    "name": "status",
                    "description": "Report connection status, configuration, and a live health check",
                    "inputSchema": {
                        "type": "object",
                        "properties": {}
                    }
                }
            ]
        }))
    }

    /// Handle call tool request
    pub async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value> {
        let params = params
            .ok_or_else(|| ServerError::invalid_params("Missing parameters for tool call"))?;

        let tool_name = params
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ServerError::invalid_params("Missing tool name"))?;

        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        debug!("Calling tool: {}", tool_name);

        let text = match tool_name {
            "connect" => self.tool_connect(arguments).await?,
            "query" => self.tool_query(arguments).await?,
            "list_databases" => self.tool_list_databases().await?,
            "list_tables" => self.tool_list_tables(arguments).await?,
            "describe_table" => self.tool_describe_table(arguments).await?,
            "disconnect" => self.tool_disconnect().await?,
            "setup_persistent" => self.tool_setup_persistent(arguments).await?,
            "status" => self.tool_status().await?,
            other => return Err(ServerError::method_not_found(other)),
        };

        Ok(json!({
            "content": [
                {
                    "type": "text",
                    "text": text
                }
            ]
        }))
    }

    /// Handle the connect tool
    async fn tool_connect(&self, arguments: Value) -> Result<String> {
        let settings = ConnectionSettings::from_args(arguments)?;
        let summary = connection_summary(&settings);

        let mut manager = self.manager.lock().await;
        manager.connect(settings).await?;

        Ok(format!("Successfully connected to {}", summary))
    }

    /// Handle the setup_persistent tool
    async fn tool_setup_persistent(&self, arguments: Value) -> Result<String> {
        let settings = ConnectionSettings::from_args(arguments)?;
        let summary = connection_summary(&settings);

        let mut manager = self.manager.lock().await;
        manager.setup_persistent(settings).await?;

        Ok(format!(
            "Successfully connected to {}. Configuration stored as default; auto-connect enabled.",
            summary
        ))
    }

    /// Handle the query tool
    async fn tool_query(&self, arguments: Value) -> Result<String> {
        let request = QueryRequest::from_args(&arguments)?;

        let mut manager = self.manager.lock().await;
        let pool = manager.ensure_connected().await?;

        let outcome = query::execute(pool, &request).await?;
        outcome.to_text()
    }

    /// Handle the list_databases tool
    async fn tool_list_databases(&self) -> Result<String> {
        let mut manager = self.manager.lock().await;
        let pool = manager.ensure_connected().await?;

        let outcome = query::fetch_introspection(
            pool,
            "list_databases",
            introspect::list_databases_statement(),
        )
        .await?;
        outcome.to_text()
    }

    /// Handle the list_tables tool
    async fn tool_list_tables(&self, arguments: Value) -> Result<String> {
        let database = arguments.get("database").and_then(|v| v.as_str());
        let sql = introspect::list_tables_statement(database);

        let mut manager = self.manager.lock().await;
        let pool = manager.ensure_connected().await?;

        let outcome = query::fetch_introspection(pool, "list_tables", &sql).await?;
        outcome.to_text()
    }

    /// Handle the describe_table tool
    async fn tool_describe_table(&self, arguments: Value) -> Result<String> {
        let table = arguments
            .get("table")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ServerError::invalid_params("Missing required parameter: table"))?;
        let database = arguments.get("database").and_then(|v| v.as_str());
        let sql = introspect::describe_table_statement(table, database);

        let mut manager = self.manager.lock().await;
        let pool = manager.ensure_connected().await?;

        let outcome = query::fetch_introspection(pool, "describe_table", &sql).await?;
        outcome.to_text()
    }

    /// Handle the disconnect tool
    async fn tool_disconnect(&self) -> Result<String> {
        let mut manager = self.manager.lock().await;
        let was_connected = manager.is_connected();
        manager.disconnect().await?;

        Ok(if was_connected {
            "Disconnected from MySQL database".to_string()
        } else {
            "No active connection; nothing to disconnect".to_string()
        })
    }

    /// Handle the status tool
    async fn tool_status(&self) -> Result<String> {
        let manager = self.manager.lock().await;
        Ok(manager.status_report().await)
    }
}

/// Shared input schema properties for the connect-style tools
fn connection_properties() -> Value {
    json!({
        "host": {
            "type": "string",
            "description": "Database host (default: localhost)"
        },
        "port": {
            "type": "integer",
            "description": "Database port (default: 3306)"
        },
        "user": {
            "type": "string",
            "description": "Database username"
        },
        "password": {
            "type": "string",
            "description": "Database password"
        },
        "database": {
            "type": "string",
            "description": "Database name to select (optional)"
        },
        "ssl": {
            "type": "boolean",
            "description": "Require TLS for the connection (default: false)"
        },
        "connection_limit": {
            "type": "integer",
            "description": "Maximum pool size (default: 10)"
        }
    })
}

/// Human-readable connection target for success messages
fn connection_summary(settings: &ConnectionSettings) -> String {
    match &settings.database {
        Some(db) => format!(
            "MySQL at {}:{}, database '{}'",
            settings.host, settings.port, db
        ),
        None => format!("MySQL at {}:{}", settings.host, settings.port),
    }
}
