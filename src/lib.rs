//! MySQL MCP Bridge
//!
//! A MySQL MCP (Model Context Protocol) adapter that exposes database
//! operations as callable tools: connect, query, schema introspection,
//! disconnect, and status, with auto-connect from remembered default
//! credentials.

pub mod config;
pub mod connection;
pub mod error;
pub mod introspect;
pub mod query;
pub mod server;

pub use config::{Config, ConnectionSettings, ServerSettings};
pub use error::{Result, ServerError};
pub use server::McpServer;
