// ABOUTME: Google Gemini API adapter implementing the ModelClient trait.
// ABOUTME: Translates message history into generateContent calls with function declarations.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use stockscout_core::message::{Message, Role, ToolCall};

use crate::config::ModelConfig;
use crate::providers::with_retries;
use crate::runtime::{AgentError, ModelClient};
use crate::tools::ToolDescriptor;

/// Schema keys the Gemini function-declaration dialect rejects.
const UNSUPPORTED_SCHEMA_KEYS: &[&str] = &["$schema", "additionalProperties"];

/// Google Gemini client. Calls the generateContent API with function
/// declarations and maps functionCall parts back to tool calls.
pub struct GeminiClient {
    client: reqwest::Client,
    config: ModelConfig,
}

impl GeminiClient {
    /// Create a client from explicit configuration.
    pub fn new(config: ModelConfig) -> Result<Self, AgentError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AgentError::ModelRequestFailed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url, self.config.model
        )
    }

    /// Build the JSON request body for the Gemini generateContent API.
    pub fn build_request_body(&self, history: &[Message], tools: &[ToolDescriptor]) -> Value {
        let system_text = history
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.text())
            .collect::<Vec<_>>()
            .join("\n\n");

        let contents: Vec<Value> = history.iter().filter_map(message_to_content).collect();
        let contents = coalesce_gemini_contents(contents);

        let mut generation_config = json!({ "temperature": self.config.temperature });
        if let Some(max_tokens) = self.config.max_output_tokens {
            generation_config["max_output_tokens"] = json!(max_tokens);
        }

        let mut body = json!({
            "contents": contents,
            "generation_config": generation_config,
        });

        if !system_text.is_empty() {
            body["system_instruction"] = json!({ "parts": [{ "text": system_text }] });
        }

        if !tools.is_empty() {
            body["tools"] = json!([{ "function_declarations": build_gemini_tools(tools) }]);
        }

        body
    }

    /// Parse a Gemini generateContent response into an assistant Message.
    pub fn parse_response(response_body: &Value) -> Result<Message, AgentError> {
        let candidates = response_body.get("candidates").and_then(|c| c.as_array());

        let Some(candidate) = candidates.and_then(|c| c.first()) else {
            if let Some(reason) = response_body
                .get("promptFeedback")
                .and_then(|f| f.get("blockReason"))
                .and_then(|r| r.as_str())
            {
                return Err(AgentError::ModelRequestFailed(format!(
                    "prompt blocked: {}",
                    reason
                )));
            }
            return Err(AgentError::InvalidResponse(
                "missing candidates in response".to_string(),
            ));
        };

        let finish_reason = candidate
            .get("finishReason")
            .and_then(|f| f.as_str())
            .unwrap_or("");

        let parts = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array());

        let Some(parts) = parts else {
            if finish_reason == "STOP" {
                return Ok(Message::assistant(""));
            }
            return Err(AgentError::InvalidResponse(format!(
                "candidate has no content (finish reason: {})",
                if finish_reason.is_empty() { "none" } else { finish_reason }
            )));
        };

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for part in parts {
            if let Some(function_call) = part.get("functionCall") {
                let name = function_call
                    .get("name")
                    .and_then(|n| n.as_str())
                    .ok_or_else(|| {
                        AgentError::InvalidResponse("functionCall missing name".to_string())
                    })?;
                let args = function_call.get("args").cloned().unwrap_or(json!({}));
                tool_calls.push(ToolCall::new(name, args));
                continue;
            }

            let is_thought = part.get("thought").and_then(|t| t.as_bool()).unwrap_or(false);
            if let Some(part_text) = part.get("text").and_then(|t| t.as_str())
                && !is_thought
            {
                text.push_str(part_text);
            }
        }

        Ok(Message::assistant_with_tool_calls(text, tool_calls))
    }

    async fn send_once(&self, body: &Value, attempt: u32) -> Result<Message, AgentError> {
        tracing::debug!(model = %self.config.model, attempt, "sending generateContent request");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    AgentError::ModelRequestFailed(format!("invalid request: {}", e))
                } else {
                    AgentError::Transient(format!("HTTP request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &error_body));
        }

        let response_body: Value = response
            .json()
            .await
            .map_err(|e| AgentError::InvalidResponse(format!("failed to parse JSON: {}", e)))?;

        Self::parse_response(&response_body)
    }
}

/// Map a non-success HTTP status to an error, separating retryable from permanent failures.
fn classify_status(status: reqwest::StatusCode, body: &str) -> AgentError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return AgentError::RateLimited;
    }
    if status.is_server_error() {
        return AgentError::Transient(format!("server error: {}", status));
    }
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return AgentError::ModelRequestFailed("Unauthorized: check GEMINI_API_KEY".to_string());
    }
    AgentError::ModelRequestFailed(format!("API error {}: {}", status, body))
}

/// Convert one message into a Gemini content entry. System messages go to
/// `system_instruction` instead and yield `None`, as do empty turns.
fn message_to_content(msg: &Message) -> Option<Value> {
    match msg.role {
        Role::System => None,
        Role::User => Some(json!({ "role": "user", "parts": [{ "text": msg.text() }] })),
        Role::Assistant => {
            let mut parts = Vec::new();
            let text = msg.text();
            if !text.is_empty() {
                parts.push(json!({ "text": text }));
            }
            for call in &msg.tool_calls {
                parts.push(json!({ "functionCall": { "name": call.name, "args": call.args } }));
            }
            if parts.is_empty() {
                return None;
            }
            Some(json!({ "role": "model", "parts": parts }))
        }
        Role::Tool => {
            let key = if msg.is_error { "error" } else { "content" };
            let mut response = Map::new();
            response.insert(key.to_string(), Value::String(msg.text()));
            let name = msg.name.clone().unwrap_or_default();
            Some(json!({
                "role": "user",
                "parts": [{
                    "functionResponse": { "name": name, "response": response }
                }]
            }))
        }
    }
}

/// Convert tool descriptors to Gemini's function declaration format.
fn build_gemini_tools(tools: &[ToolDescriptor]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": sanitize_schema(&tool.input_schema),
            })
        })
        .collect()
}

/// Strip JSON-schema keys Gemini rejects, recursively.
fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .iter()
                .filter(|(key, _)| !UNSUPPORTED_SCHEMA_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), sanitize_schema(value)))
                .collect();
            Value::Object(cleaned)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        other => other.clone(),
    }
}

/// Coalesce consecutive Gemini contents with the same role by merging their
/// parts (Gemini requires alternating turns).
fn coalesce_gemini_contents(contents: Vec<Value>) -> Vec<Value> {
    let mut result: Vec<Value> = Vec::new();

    for content in contents {
        let role = content.get("role").and_then(|r| r.as_str()).unwrap_or("user");
        let parts = content
            .get("parts")
            .and_then(|p| p.as_array())
            .cloned()
            .unwrap_or_default();

        if let Some(last) = result.last_mut()
            && last.get("role").and_then(|r| r.as_str()) == Some(role)
            && let Some(last_parts) = last.get_mut("parts").and_then(|p| p.as_array_mut())
        {
            last_parts.extend(parts);
            continue;
        }

        result.push(json!({ "role": role, "parts": parts }));
    }

    result
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(
        &self,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<Message, AgentError> {
        let body = self.build_request_body(history, tools);
        with_retries(
            self.config.max_retries,
            self.config.retry_base_delay,
            |attempt| self.send_once(&body, attempt),
        )
        .await
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
