// ABOUTME: Entry point for the stockscout binary.
// ABOUTME: Parses CLI arguments, initializes tracing, loads config, and runs a search or a recommendation.

use std::io::IsTerminal;

use anyhow::Context;
use clap::{Parser, Subcommand};

use stockscout_agent::workflow::{
    DEFAULT_RECOMMEND_QUERY, DEFAULT_SEARCH_QUERY, RecommendOptions, run_stock_recommender,
    run_web_search,
};
use stockscout_agent::{AppConfig, McpConnector, create_model_client};
use stockscout_core::FormatOptions;

#[derive(Parser)]
#[command(name = "stockscout", version, about = "Tool-using LLM agents for web search and NSE stock picks")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a question with a single web-search agent
    Search {
        #[arg(long, default_value = DEFAULT_SEARCH_QUERY)]
        query: String,
    },
    /// Run the four-agent stock recommendation workflow
    Recommend {
        #[arg(long, default_value = DEFAULT_RECOMMEND_QUERY)]
        query: String,
        /// Also print each agent's internal model and tool updates
        #[arg(long)]
        subgraphs: bool,
        /// Print every message of an update instead of only the last one
        #[arg(long)]
        all_messages: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("stockscout=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Recommend {
        query: DEFAULT_RECOMMEND_QUERY.to_string(),
        subgraphs: false,
        all_messages: false,
    });

    let config = AppConfig::from_env().context("failed to load configuration")?;
    let client = create_model_client(&config.model)?;
    let connector = McpConnector::new(config.tool_provider.clone());

    tracing::info!(
        provider = client.provider_name(),
        model = client.model_name(),
        "stockscout starting up"
    );

    let mut stdout = std::io::stdout();
    match command {
        Command::Search { query } => {
            run_web_search(&connector, client, &config.run, &query, &mut stdout).await?;
        }
        Command::Recommend {
            query,
            subgraphs,
            all_messages,
        } => {
            let options = RecommendOptions {
                subgraphs,
                format: FormatOptions {
                    last_message: !all_messages,
                    bold_titles: stdout.is_terminal(),
                },
            };
            run_stock_recommender(&connector, client, &config.run, &query, options, &mut stdout)
                .await?;
        }
    }

    Ok(())
}
