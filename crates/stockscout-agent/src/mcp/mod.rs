// ABOUTME: Model Context Protocol support for talking to external tool-provider processes.
// ABOUTME: Re-exports the stdio client and the JSON-RPC wire types.

pub mod client;
pub mod types;

pub use client::McpClient;
pub use types::{CallToolResult, McpError, McpTool, ToolContent};
