// ABOUTME: Agent system for stockscout: model clients, tool provider connector, and orchestration.
// ABOUTME: Exposes the single-agent runner, the four-step supervisor, and the two end-to-end workflows.

pub mod client;
pub mod config;
pub mod mcp;
pub mod providers;
pub mod roles;
pub mod runner;
pub mod runtime;
pub mod supervisor;
pub mod testing;
pub mod tools;
pub mod workflow;

pub use client::create_model_client;
pub use config::{AppConfig, ConfigError, ModelConfig, RunConfig, ToolProviderConfig};
pub use roles::AgentRole;
pub use runner::{AgentDefinition, AgentRun, AgentRunner, RunState};
pub use runtime::{AgentError, ModelClient};
pub use supervisor::{Supervisor, SupervisorRun, SupervisorStream};
pub use tools::{McpConnector, ToolConnector, ToolDescriptor, ToolOutput, Toolset};
