// ABOUTME: Tool registry abstractions: descriptors, toolsets, and the connector that fetches them.
// ABOUTME: McpConnector launches the tool provider once and exposes its tools as an McpToolset.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use stockscout_core::message::{Content, ContentBlock};

use crate::config::ToolProviderConfig;
use crate::mcp::{McpClient, McpError, ToolContent};
use crate::runtime::AgentError;

/// A callable tool as seen by the model: a unique name, a description, and
/// a JSON schema for its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// What a tool invocation produced. `is_error` marks results the tool
/// itself flagged as failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: Content,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Content::Text(text.into()),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: Content::Text(text.into()),
            is_error: true,
        }
    }
}

/// A read-only registry of tools fetched once per run.
#[async_trait]
pub trait Toolset: Send + Sync {
    /// Every tool this set offers.
    fn descriptors(&self) -> &[ToolDescriptor];

    /// Invoke the named tool with JSON arguments.
    async fn invoke(&self, name: &str, args: Value) -> Result<ToolOutput, AgentError>;

    fn names(&self) -> Vec<String> {
        self.descriptors().iter().map(|d| d.name.clone()).collect()
    }

    fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.descriptors().iter().find(|d| d.name == name)
    }
}

/// Produces the toolset for a run.
#[async_trait]
pub trait ToolConnector: Send + Sync {
    async fn get_tools(&self) -> Result<Arc<dyn Toolset>, AgentError>;
}

/// Connector that launches an MCP server over stdio.
pub struct McpConnector {
    config: ToolProviderConfig,
}

impl McpConnector {
    pub fn new(config: ToolProviderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ToolConnector for McpConnector {
    async fn get_tools(&self) -> Result<Arc<dyn Toolset>, AgentError> {
        let unavailable = |e: McpError| {
            tracing::error!(server = %self.config.name, error = %e, "tool provider unavailable");
            AgentError::ToolProviderUnavailable(format!("{}: {}", self.config.name, e))
        };

        let client = McpClient::connect(&self.config).await.map_err(unavailable)?;
        let listed = match client.list_tools(Some(self.config.handshake_timeout)).await {
            Ok(listed) => listed,
            Err(e) => {
                client.shutdown().await;
                return Err(unavailable(e));
            }
        };

        let mut seen = HashSet::new();
        let mut tools = Vec::with_capacity(listed.len());
        for tool in listed {
            if !seen.insert(tool.name.clone()) {
                tracing::warn!(server = %self.config.name, tool = %tool.name, "duplicate tool name ignored");
                continue;
            }
            tools.push(ToolDescriptor {
                description: tool.description.unwrap_or_default(),
                name: tool.name,
                input_schema: tool.input_schema,
            });
        }

        tracing::info!(
            server = %self.config.name,
            provider = client.server_info().map(|info| info.name.as_str()).unwrap_or("unknown"),
            count = tools.len(),
            "fetched tools"
        );

        Ok(Arc::new(McpToolset {
            server: self.config.name.clone(),
            client,
            tools,
        }))
    }
}

/// Tools served by a live MCP client. The server process stops when the
/// toolset is dropped.
pub struct McpToolset {
    server: String,
    client: McpClient,
    tools: Vec<ToolDescriptor>,
}

fn content_block(item: ToolContent) -> Option<ContentBlock> {
    match item {
        ToolContent::Text { text } => Some(ContentBlock::Text { text }),
        ToolContent::Image { mime_type } => Some(ContentBlock::Image { mime_type }),
        ToolContent::Resource { resource } => Some(ContentBlock::Resource {
            uri: resource.uri,
            text: resource.text,
        }),
        ToolContent::Unsupported => None,
    }
}

#[async_trait]
impl Toolset for McpToolset {
    fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    async fn invoke(&self, name: &str, args: Value) -> Result<ToolOutput, AgentError> {
        if self.get(name).is_none() {
            return Err(AgentError::ToolInvocation {
                tool: name.to_string(),
                message: format!("unknown tool on server '{}'", self.server),
            });
        }

        let result = self
            .client
            .call_tool(name, args)
            .await
            .map_err(|e| AgentError::ToolInvocation {
                tool: name.to_string(),
                message: e.to_string(),
            })?;

        let blocks: Vec<ContentBlock> = result.content.into_iter().filter_map(content_block).collect();
        Ok(ToolOutput {
            content: Content::Blocks(blocks),
            is_error: result.is_error.unwrap_or(false),
        })
    }
}
