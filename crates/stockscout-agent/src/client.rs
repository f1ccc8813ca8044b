// ABOUTME: Factory function for creating model clients from configuration.
// ABOUTME: Resolves the configured provider name into a shared ModelClient trait object.

use std::sync::Arc;

use crate::config::ModelConfig;
use crate::providers::gemini::GeminiClient;
use crate::runtime::{AgentError, ModelClient};

/// Create a model client for the provider named in `config`.
///
/// The returned client is shared by every agent in a run.
pub fn create_model_client(config: &ModelConfig) -> Result<Arc<dyn ModelClient>, AgentError> {
    match config.provider.as_str() {
        "gemini" | "google" => {
            let client = GeminiClient::new(config.clone())?;
            tracing::debug!(model = %config.model, temperature = config.temperature, "created gemini client");
            Ok(Arc::new(client))
        }
        unknown => Err(AgentError::ModelRequestFailed(format!(
            "unsupported LLM provider: {}",
            unknown
        ))),
    }
}
