// ABOUTME: The two end-to-end runs: a single web-search agent and the supervised stock recommender.
// ABOUTME: Each fetches tools once, builds its agents, and writes plain-text output to a writer.

use std::io::Write;
use std::sync::Arc;

use futures::StreamExt;

use stockscout_core::format::{FormatOptions, format_update};

use crate::config::RunConfig;
use crate::roles::WEB_SEARCH_PROMPT;
use crate::runner::AgentDefinition;
use crate::runtime::{AgentError, ModelClient};
use crate::supervisor::{Supervisor, SupervisorRun};
use crate::tools::ToolConnector;

pub const DEFAULT_RECOMMEND_QUERY: &str = "Give me good stock recommendation from NSE";

pub const DEFAULT_SEARCH_QUERY: &str =
    "How many runs did Virat Kohli score in today's Vijay Hazare Trophy match against AP?";

/// Name of the standalone search agent.
pub const WEB_SEARCH_AGENT: &str = "web_search_agent";

/// Options for the supervised run's streamed output.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecommendOptions {
    /// Also stream each agent's internal model and tool updates.
    pub subgraphs: bool,
    pub format: FormatOptions,
}

/// Answer `query` with one tool-using agent and write its final answer.
pub async fn run_web_search(
    connector: &dyn ToolConnector,
    client: Arc<dyn ModelClient>,
    run: &RunConfig,
    query: &str,
    out: &mut impl Write,
) -> Result<String, AgentError> {
    let tools = connector.get_tools().await?;
    tracing::info!(tools = tools.descriptors().len(), "tools loaded");

    let agent = AgentDefinition::new(WEB_SEARCH_AGENT, WEB_SEARCH_PROMPT, client, tools)
        .max_iterations(run.max_iterations);
    let answer = agent.invoke(query).await?.output();

    writeln!(out, "{}", answer)?;
    Ok(answer)
}

/// Run the four-step recommendation plan, writing each update as it arrives.
pub async fn run_stock_recommender(
    connector: &dyn ToolConnector,
    client: Arc<dyn ModelClient>,
    run: &RunConfig,
    query: &str,
    options: RecommendOptions,
    out: &mut impl Write,
) -> Result<SupervisorRun, AgentError> {
    let tools = connector.get_tools().await?;
    tracing::info!(tools = tools.descriptors().len(), "tools loaded");

    let supervisor = Arc::new(Supervisor::new(client, tools, run));
    let mut stream = supervisor.stream(query, options.subgraphs);

    while let Some(update) = stream.next().await {
        let rendered = format_update(&update, options.format);
        if !rendered.is_empty() {
            write!(out, "{}", rendered)?;
            out.flush()?;
        }
    }

    stream.finish().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingConnector, ScriptedModelClient, StaticConnector, StaticToolset};
    use crate::tools::ToolOutput;
    use serde_json::json;
    use stockscout_core::message::{Message, Role, ToolCall};

    fn search_tools() -> Arc<StaticToolset> {
        Arc::new(StaticToolset::new().with_tool("search_engine", "Search the web", |_| {
            Ok(ToolOutput::text("Kohli 131 (118)"))
        }))
    }

    fn searching_client(answer: &'static str) -> Arc<ScriptedModelClient> {
        Arc::new(ScriptedModelClient::from_fn(move |history, _| {
            if history.last().is_some_and(|m| m.role == Role::Tool) {
                Ok(Message::assistant(answer))
            } else {
                Ok(Message::assistant_with_tool_calls(
                    "",
                    vec![ToolCall::new("search_engine", json!({"query": "q"}))],
                ))
            }
        }))
    }

    #[tokio::test]
    async fn web_search_writes_final_answer() {
        let connector = StaticConnector::new(search_tools());
        let mut out = Vec::new();

        let answer = run_web_search(
            &connector,
            searching_client("Virat Kohli scored 131 runs."),
            &RunConfig::default(),
            DEFAULT_SEARCH_QUERY,
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(answer, "Virat Kohli scored 131 runs.");
        assert_eq!(String::from_utf8(out).unwrap(), "Virat Kohli scored 131 runs.\n");
        assert_eq!(connector.call_count(), 1);
    }

    #[tokio::test]
    async fn unavailable_provider_prints_nothing() {
        let connector = FailingConnector::new("spawn npx: not found");
        let client = Arc::new(ScriptedModelClient::always("should not be asked"));
        let mut out = Vec::new();

        let result = run_stock_recommender(
            &connector,
            client.clone(),
            &RunConfig::default(),
            DEFAULT_RECOMMEND_QUERY,
            RecommendOptions::default(),
            &mut out,
        )
        .await;

        assert!(matches!(result, Err(AgentError::ToolProviderUnavailable(_))));
        assert!(out.is_empty());
        assert_eq!(client.call_count(), 0);

        let search = run_web_search(
            &connector,
            client.clone(),
            &RunConfig::default(),
            DEFAULT_SEARCH_QUERY,
            &mut out,
        )
        .await;
        assert!(matches!(search, Err(AgentError::ToolProviderUnavailable(_))));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn recommender_fetches_tools_once_and_prints_updates() {
        let connector = StaticConnector::new(search_tools());
        let mut out = Vec::new();

        let run = run_stock_recommender(
            &connector,
            searching_client("RELIANCE: Buy"),
            &RunConfig::default(),
            DEFAULT_RECOMMEND_QUERY,
            RecommendOptions::default(),
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(connector.call_count(), 1);
        assert_eq!(run.outputs.len(), 4);

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Update from node supervisor:"));
        assert!(printed.contains("Update from node price_recommender_agent:"));
        assert!(printed.contains("transfer_to_market_data_agent"));
        assert!(printed.contains("RELIANCE: Buy"));
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn write_failure_stops_the_run() {
        let connector = StaticConnector::new(search_tools());
        let client = searching_client("RELIANCE: Buy");

        let result = run_stock_recommender(
            &connector,
            client.clone(),
            &RunConfig::default(),
            DEFAULT_RECOMMEND_QUERY,
            RecommendOptions::default(),
            &mut BrokenPipe,
        )
        .await;

        assert!(matches!(result, Err(AgentError::Output(_))));

        // The background run is aborted, so nothing holds the client any more.
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while Arc::strong_count(&client) > 1 {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("aborted run should release the model client");
    }

    #[tokio::test]
    async fn subgraph_mode_prints_only_nested_updates() {
        let connector = StaticConnector::new(search_tools());
        let mut out = Vec::new();

        run_stock_recommender(
            &connector,
            searching_client("INFY: Hold"),
            &RunConfig::default(),
            DEFAULT_RECOMMEND_QUERY,
            RecommendOptions {
                subgraphs: true,
                format: FormatOptions {
                    last_message: true,
                    bold_titles: false,
                },
            },
            &mut out,
        )
        .await
        .unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Update from subgraph stock_finder_agent:"));
        assert!(printed.contains("\tUpdate from node tools:"));
        assert!(!printed.contains("Update from node supervisor:"));
    }
}
