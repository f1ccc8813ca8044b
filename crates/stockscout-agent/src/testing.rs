// ABOUTME: Test utilities for stockscout-agent: scripted model clients, static toolsets, and connectors.
// ABOUTME: Used in tests to drive agents and the supervisor without real API calls or processes.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Value, json};

use stockscout_core::message::Message;

use crate::runtime::{AgentError, ModelClient};
use crate::tools::{ToolConnector, ToolDescriptor, ToolOutput, Toolset};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

type Responder =
    dyn Fn(&[Message], &[ToolDescriptor]) -> Result<Message, AgentError> + Send + Sync;

/// A model client whose replies are decided by a closure or a fixed script.
///
/// Every history it receives is recorded so tests can inspect what each
/// agent sent upstream.
pub struct ScriptedModelClient {
    responder: Box<Responder>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModelClient {
    /// Reply with `replies` in order, then with "Done." once the script runs out.
    pub fn new(replies: Vec<Message>) -> Self {
        let queue = Mutex::new(VecDeque::from(replies));
        Self::from_fn(move |_, _| {
            Ok(lock(&queue)
                .pop_front()
                .unwrap_or_else(|| Message::assistant("Done.")))
        })
    }

    /// Reply with the given text to every request.
    pub fn always(text: &str) -> Self {
        let text = text.to_owned();
        Self::from_fn(move |_, _| Ok(Message::assistant(text.as_str())))
    }

    /// Decide each reply from the history and available tools.
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&[Message], &[ToolDescriptor]) -> Result<Message, AgentError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every history passed to `generate`, in call order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    async fn generate(
        &self,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<Message, AgentError> {
        lock(&self.requests).push(history.to_vec());
        (self.responder)(history, tools)
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }
}

type Handler = dyn Fn(&Value) -> Result<ToolOutput, AgentError> + Send + Sync;

/// An in-memory toolset whose tools are plain closures.
#[derive(Default)]
pub struct StaticToolset {
    descriptors: Vec<ToolDescriptor>,
    handlers: HashMap<String, Box<Handler>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl StaticToolset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool with an open object schema.
    pub fn with_tool<F>(mut self, name: &str, description: &str, handler: F) -> Self
    where
        F: Fn(&Value) -> Result<ToolOutput, AgentError> + Send + Sync + 'static,
    {
        self.descriptors.push(ToolDescriptor {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        });
        self.handlers.insert(name.to_string(), Box::new(handler));
        self
    }

    /// Every invocation as (tool name, arguments), in call order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Toolset for StaticToolset {
    fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    async fn invoke(&self, name: &str, args: Value) -> Result<ToolOutput, AgentError> {
        lock(&self.calls).push((name.to_string(), args.clone()));
        match self.handlers.get(name) {
            Some(handler) => handler(&args),
            None => Err(AgentError::ToolInvocation {
                tool: name.to_string(),
                message: "unknown tool".to_string(),
            }),
        }
    }
}

/// A connector that hands out a prebuilt toolset and counts how often it
/// was asked.
pub struct StaticConnector {
    toolset: Arc<dyn Toolset>,
    calls: AtomicUsize,
}

impl StaticConnector {
    pub fn new(toolset: Arc<dyn Toolset>) -> Self {
        Self {
            toolset,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolConnector for StaticConnector {
    async fn get_tools(&self) -> Result<Arc<dyn Toolset>, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.toolset))
    }
}

/// A connector whose tool provider never comes up.
pub struct FailingConnector {
    reason: String,
}

impl FailingConnector {
    pub fn new(reason: &str) -> Self {
        Self {
            reason: reason.to_owned(),
        }
    }
}

#[async_trait]
impl ToolConnector for FailingConnector {
    async fn get_tools(&self) -> Result<Arc<dyn Toolset>, AgentError> {
        Err(AgentError::ToolProviderUnavailable(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_client_replays_then_finishes() {
        let client = ScriptedModelClient::new(vec![Message::assistant("first")]);

        let first = client.generate(&[Message::user("q")], &[]).await.unwrap();
        let second = client.generate(&[Message::user("q2")], &[]).await.unwrap();

        assert_eq!(first.text(), "first");
        assert_eq!(second.text(), "Done.");
        assert_eq!(client.call_count(), 2);
        assert_eq!(client.requests()[1][0].text(), "q2");
    }

    #[tokio::test]
    async fn static_toolset_records_calls() {
        let tools = StaticToolset::new().with_tool("echo", "Echo back", |args| {
            Ok(ToolOutput::text(args.to_string()))
        });

        let out = tools.invoke("echo", json!({"x": 1})).await.unwrap();
        assert_eq!(out.content.as_text(), r#"{"x":1}"#);

        let missing = tools.invoke("nope", json!({})).await;
        assert!(matches!(missing, Err(AgentError::ToolInvocation { .. })));

        assert_eq!(tools.calls().len(), 2);
    }

    #[tokio::test]
    async fn connectors_count_and_fail() {
        let connector = StaticConnector::new(Arc::new(StaticToolset::new()));
        connector.get_tools().await.unwrap();
        assert_eq!(connector.call_count(), 1);

        let failing = FailingConnector::new("npx exited");
        assert!(matches!(
            failing.get_tools().await,
            Err(AgentError::ToolProviderUnavailable(_))
        ));
    }
}
