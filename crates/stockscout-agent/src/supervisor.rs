// ABOUTME: Fixed four-step supervisor that chains the stock recommendation agents.
// ABOUTME: Forwards each agent's final output to the next step and streams updates with handoffs.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

use stockscout_core::handoff::{self, SUPERVISOR_NAME};
use stockscout_core::message::Message;
use stockscout_core::update::Update;

use crate::config::RunConfig;
use crate::roles::{AgentRole, SUPERVISOR_PROMPT};
use crate::runner::{AgentDefinition, AgentRun, AgentRunner, UpdateSender};
use crate::runtime::{AgentError, ModelClient};
use crate::tools::Toolset;

/// Follow-up sent to an agent that finished a step without any data.
pub const EMPTY_STEP_NUDGE: &str = "You returned without data. Try again using your tools.";

/// What one step of the plan produced.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub role: AgentRole,
    /// The user message the agent was given.
    pub prompt: String,
    /// The agent's final answer.
    pub output: String,
    /// Agent runs spent on this step, including empty-step retries.
    pub attempts: u32,
}

/// The outcome of a complete supervised run.
#[derive(Debug, Clone)]
pub struct SupervisorRun {
    pub outputs: Vec<StepOutput>,
    /// Merged history: orchestration prompt, query, handoffs, and every
    /// agent's final answer. The orchestration prompt is kept for the record
    /// only; no model reads it, the plan itself is fixed.
    pub messages: Vec<Message>,
    pub final_answer: Message,
}

impl SupervisorRun {
    pub fn output(&self) -> String {
        self.final_answer.text()
    }
}

/// Runs the stock finder, market data, news analyst, and price recommender
/// agents in that order over one shared toolset.
pub struct Supervisor {
    agents: Vec<(AgentRole, AgentDefinition)>,
    empty_step_retries: u32,
}

impl Supervisor {
    pub fn new(client: Arc<dyn ModelClient>, tools: Arc<dyn Toolset>, run: &RunConfig) -> Self {
        let agents = AgentRole::PLAN
            .iter()
            .map(|role| {
                let definition = AgentDefinition::new(
                    role.label(),
                    role.system_prompt(),
                    Arc::clone(&client),
                    Arc::clone(&tools),
                )
                .max_iterations(run.max_iterations);
                (*role, definition)
            })
            .collect();

        Self {
            agents,
            empty_step_retries: run.empty_step_retries,
        }
    }

    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.iter().map(|(_, def)| def.name.as_str()).collect()
    }

    /// Build the user message for `role` from the query and the outputs of
    /// the steps before it.
    pub fn step_prompt(role: AgentRole, query: &str, outputs: &[String]) -> String {
        let previous = |index: usize| outputs.get(index).map(String::as_str).unwrap_or_default();
        match role {
            AgentRole::StockFinder => query.to_string(),
            AgentRole::MarketData => format!(
                "Get the latest market data for the stocks selected below.\n\n{}",
                previous(0)
            ),
            AgentRole::NewsAnalyst => format!(
                "Find and classify recent news for these stocks.\n\nSelected stocks:\n{}\n\nMarket data:\n{}",
                previous(0),
                previous(1)
            ),
            AgentRole::PriceRecommender => format!(
                "Recommend Buy, Sell or Hold with a target price for each stock.\n\nMarket data:\n{}\n\nNews analysis:\n{}",
                previous(1),
                previous(2)
            ),
        }
    }

    /// A step returned without data when its final answer is blank.
    fn empty_result(run: &AgentRun) -> bool {
        run.final_answer.content.is_empty()
    }

    /// Execute the full plan, publishing updates on `sender` as they happen.
    ///
    /// With `subgraphs` set, every runner's `model` and `tools` updates are
    /// forwarded too and top-level updates carry an empty namespace.
    pub async fn run(
        &self,
        query: &str,
        sender: UpdateSender,
        subgraphs: bool,
    ) -> Result<SupervisorRun, AgentError> {
        let top_level = |node: &str, messages: Vec<Message>| {
            if subgraphs {
                Update::tagged(Vec::new(), node, messages)
            } else {
                Update::top_level(node, messages)
            }
        };
        let publish = |update: Update| {
            // A dropped receiver only means nobody is watching.
            let _ = sender.send(update);
        };

        let mut messages = vec![Message::system(SUPERVISOR_PROMPT), Message::user(query)];
        let mut outputs: Vec<StepOutput> = Vec::with_capacity(self.agents.len());

        for (step, (role, definition)) in self.agents.iter().enumerate() {
            let prior: Vec<String> = outputs.iter().map(|o| o.output.clone()).collect();
            let prompt = Self::step_prompt(*role, query, &prior);

            tracing::info!(step = step + 1, agent = %definition.name, "handing off to agent");
            let handoff_msgs = handoff::transfer_to(&definition.name);
            messages.extend(handoff_msgs.iter().cloned());
            publish(top_level(SUPERVISOR_NAME, handoff_msgs));

            let mut input = vec![Message::user(prompt.clone())];
            let mut attempts = 0u32;
            let agent_run = loop {
                attempts += 1;
                let mut runner = AgentRunner::new(definition.clone(), input.clone());
                if subgraphs {
                    runner = runner.with_sink(sender.clone());
                }
                let agent_run = runner.run().await?;

                if !Self::empty_result(&agent_run) || attempts > self.empty_step_retries {
                    if Self::empty_result(&agent_run) {
                        tracing::warn!(agent = %definition.name, attempts, "agent returned without data");
                    }
                    break agent_run;
                }

                tracing::warn!(
                    agent = %definition.name,
                    attempt = attempts,
                    "agent returned without data, asking it to retry"
                );
                // Skip the system instruction and the blank answer; the
                // runner adds the instruction back.
                let produced = agent_run.messages.len().saturating_sub(1).max(1);
                input = agent_run.messages[1..produced].to_vec();
                input.push(Message::user(EMPTY_STEP_NUDGE));
            };

            let mut agent_msgs = vec![agent_run.final_answer.clone()];
            agent_msgs.extend(handoff::transfer_back(&definition.name));
            messages.extend(agent_msgs.iter().cloned());
            publish(top_level(definition.name.as_str(), agent_msgs));

            outputs.push(StepOutput {
                role: *role,
                prompt,
                output: agent_run.output(),
                attempts,
            });
        }

        let answer = outputs.last().map(|o| o.output.clone()).unwrap_or_default();
        let final_answer = Message::assistant(answer).named(SUPERVISOR_NAME);
        messages.push(final_answer.clone());
        publish(top_level(SUPERVISOR_NAME, vec![final_answer.clone()]));

        tracing::info!(steps = outputs.len(), "supervised run completed");

        Ok(SupervisorRun {
            outputs,
            messages,
            final_answer,
        })
    }

    /// Start the plan in a background task and stream its updates.
    pub fn stream(self: Arc<Self>, query: impl Into<String>, subgraphs: bool) -> SupervisorStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let query = query.into();
        let handle = tokio::spawn(async move { self.run(&query, tx, subgraphs).await });

        SupervisorStream {
            updates: UnboundedReceiverStream::new(rx),
            handle: Some(handle),
        }
    }
}

/// Updates from a supervised run in progress. The stream ends when the run
/// does; call [`SupervisorStream::finish`] afterwards for its result.
/// Dropping the stream before `finish` aborts the run.
pub struct SupervisorStream {
    updates: UnboundedReceiverStream<Update>,
    handle: Option<JoinHandle<Result<SupervisorRun, AgentError>>>,
}

impl SupervisorStream {
    /// Wait for the run to end and return its outcome.
    pub async fn finish(mut self) -> Result<SupervisorRun, AgentError> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| AgentError::Aborted("run already collected".to_string()))?;
        match handle.await {
            Ok(result) => result,
            Err(e) => Err(AgentError::Aborted(e.to_string())),
        }
    }
}

impl Drop for SupervisorStream {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                tracing::warn!("supervised run dropped before completion, aborting");
            }
            handle.abort();
        }
    }
}

impl Stream for SupervisorStream {
    type Item = Update;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.updates).poll_next(cx)
    }
}
