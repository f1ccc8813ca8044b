// ABOUTME: Single-agent reasoning loop, expressed as an explicit model/tool state machine.
// ABOUTME: Alternates between asking the model and running requested tools until a final answer.

use std::sync::Arc;

use tokio::sync::mpsc;

use stockscout_core::message::{Message, ToolCall};
use stockscout_core::update::Update;

use crate::config::DEFAULT_MAX_ITERATIONS;
use crate::runtime::{AgentError, ModelClient};
use crate::tools::Toolset;

/// Channel on which runners and the supervisor publish updates.
pub type UpdateSender = mpsc::UnboundedSender<Update>;

/// Where a runner is in its reasoning loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    AwaitingModel,
    AwaitingTool,
    Done,
}

/// An agent: a name, instructions, a model client, and the tools it may call.
/// Definitions are cheap to clone and share their client and toolset.
#[derive(Clone)]
pub struct AgentDefinition {
    pub name: String,
    pub instructions: String,
    pub client: Arc<dyn ModelClient>,
    pub tools: Arc<dyn Toolset>,
    pub max_iterations: usize,
}

impl AgentDefinition {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        client: Arc<dyn ModelClient>,
        tools: Arc<dyn Toolset>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            client,
            tools,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Cap the number of model calls per run.
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Run this agent to completion on a single user message.
    pub async fn invoke(&self, input: &str) -> Result<AgentRun, AgentError> {
        AgentRunner::new(self.clone(), vec![Message::user(input)])
            .run()
            .await
    }
}

/// The outcome of a finished agent run.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub agent: String,
    /// Full history: system instruction, input, and everything produced.
    pub messages: Vec<Message>,
    pub final_answer: Message,
    pub iterations: usize,
    pub tool_calls: usize,
    input_len: usize,
}

impl AgentRun {
    /// The final answer as text.
    pub fn output(&self) -> String {
        self.final_answer.text()
    }

    /// Messages produced during the run: model replies and tool results.
    pub fn new_messages(&self) -> &[Message] {
        &self.messages[self.input_len.min(self.messages.len())..]
    }
}

/// Drives one agent through its reasoning loop.
pub struct AgentRunner {
    definition: AgentDefinition,
    state: RunState,
    history: Vec<Message>,
    pending: Vec<ToolCall>,
    input_len: usize,
    iterations: usize,
    tool_calls: usize,
    namespace: Vec<String>,
    sink: Option<UpdateSender>,
}

impl AgentRunner {
    /// Start a run with the agent's instructions followed by `input`.
    pub fn new(definition: AgentDefinition, input: Vec<Message>) -> Self {
        let mut history = Vec::with_capacity(input.len() + 1);
        history.push(Message::system(definition.instructions.clone()));
        history.extend(input);

        let namespace = vec![format!("{}:{}", definition.name, ulid::Ulid::new())];
        Self {
            definition,
            state: RunState::AwaitingModel,
            input_len: history.len(),
            history,
            pending: Vec::new(),
            iterations: 0,
            tool_calls: 0,
            namespace,
            sink: None,
        }
    }

    /// Publish `model` and `tools` updates on `sink` as the run progresses.
    pub fn with_sink(mut self, sink: UpdateSender) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn namespace(&self) -> &[String] {
        &self.namespace
    }

    fn emit(&self, node: &str, messages: Vec<Message>) {
        if let Some(sink) = &self.sink {
            // A dropped receiver only means nobody is watching.
            let _ = sink.send(Update::tagged(self.namespace.clone(), node, messages));
        }
    }

    /// Perform one transition and return the new state.
    pub async fn step(&mut self) -> Result<RunState, AgentError> {
        match self.state {
            RunState::AwaitingModel => {
                if self.iterations >= self.definition.max_iterations {
                    tracing::error!(
                        agent = %self.definition.name,
                        limit = self.definition.max_iterations,
                        "agent exceeded step limit"
                    );
                    return Err(AgentError::AgentStepLimitExceeded {
                        agent: self.definition.name.clone(),
                        limit: self.definition.max_iterations,
                    });
                }
                self.iterations += 1;

                let reply = self
                    .definition
                    .client
                    .generate(&self.history, self.definition.tools.descriptors())
                    .await?
                    .named(self.definition.name.clone());

                tracing::debug!(
                    agent = %self.definition.name,
                    iteration = self.iterations,
                    tool_calls = reply.tool_calls.len(),
                    "model replied"
                );

                self.state = if reply.has_tool_calls() {
                    self.pending = reply.tool_calls.clone();
                    RunState::AwaitingTool
                } else {
                    RunState::Done
                };
                self.history.push(reply.clone());
                self.emit("model", vec![reply]);
            }
            RunState::AwaitingTool => {
                let calls = std::mem::take(&mut self.pending);
                let mut results = Vec::with_capacity(calls.len());

                for call in calls {
                    self.tool_calls += 1;
                    let result = match self.definition.tools.invoke(&call.name, call.args.clone()).await {
                        Ok(output) => {
                            if output.is_error {
                                tracing::warn!(agent = %self.definition.name, tool = %call.name, "tool reported an error");
                            }
                            Message::tool_result(&call.id, &call.name, output.content, output.is_error)
                        }
                        Err(e) => {
                            tracing::warn!(
                                agent = %self.definition.name,
                                tool = %call.name,
                                error = %e,
                                "tool invocation failed, reporting to model"
                            );
                            Message::tool_result(&call.id, &call.name, format!("Error: {}", e), true)
                        }
                    };
                    results.push(result);
                }

                self.history.extend(results.iter().cloned());
                self.emit("tools", results);
                self.state = RunState::AwaitingModel;
            }
            RunState::Done => {}
        }

        Ok(self.state)
    }

    /// Step until the model produces a final answer.
    pub async fn run(mut self) -> Result<AgentRun, AgentError> {
        tracing::info!(agent = %self.definition.name, "agent run started");

        while self.step().await? != RunState::Done {}

        let final_answer = self
            .history
            .last()
            .cloned()
            .ok_or_else(|| AgentError::InvalidResponse("empty history".to_string()))?;

        tracing::info!(
            agent = %self.definition.name,
            iterations = self.iterations,
            tool_calls = self.tool_calls,
            "agent run completed"
        );

        Ok(AgentRun {
            agent: self.definition.name,
            messages: self.history,
            final_answer,
            iterations: self.iterations,
            tool_calls: self.tool_calls,
            input_len: self.input_len,
        })
    }
}
