// ABOUTME: Defines the ModelClient trait that all LLM provider adapters must implement.
// ABOUTME: Also defines AgentError, the error taxonomy shared by clients, tools, and runners.

use async_trait::async_trait;

use stockscout_core::message::Message;

use crate::tools::ToolDescriptor;

/// Errors that can occur while running agents.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The tool provider process could not be started or the handshake failed.
    #[error("Tool provider unavailable: {0}")]
    ToolProviderUnavailable(String),

    /// The model provider rejected the request, or the retry budget ran out.
    #[error("Model request failed: {0}")]
    ModelRequestFailed(String),

    /// Upstream asked us to slow down. Retried by the provider helper.
    #[error("Rate limited")]
    RateLimited,

    /// Network failure or server-side error. Retried by the provider helper.
    #[error("Transient provider error: {0}")]
    Transient(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A single tool call failed. Runners feed this back to the model.
    #[error("Tool '{tool}' failed: {message}")]
    ToolInvocation { tool: String, message: String },

    #[error("Agent '{agent}' exceeded its step limit of {limit}")]
    AgentStepLimitExceeded { agent: String, limit: usize },

    #[error("Run aborted: {0}")]
    Aborted(String),

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl AgentError {
    /// True for failures worth retrying: rate limits and transient upstream errors.
    pub fn is_transient(&self) -> bool {
        matches!(self, AgentError::RateLimited | AgentError::Transient(_))
    }
}

/// Trait that all LLM provider adapters must implement. Each provider
/// translates a message history plus tool descriptors into an API call and
/// parses the reply into an assistant Message.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Produce the next assistant message. The returned message either holds
    /// a final text answer or one or more tool-call requests.
    async fn generate(
        &self,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<Message, AgentError>;

    /// Provider name for logging and display (e.g. "gemini").
    fn provider_name(&self) -> &str;

    /// Model identifier being used (e.g. "gemini-2.5-flash").
    fn model_name(&self) -> &str;
}
