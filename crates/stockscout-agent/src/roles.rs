// ABOUTME: Agent roles for the stock recommendation workflow and their system prompts.
// ABOUTME: Also holds the supervisor orchestration prompt and the single web-search agent prompt.

use serde::{Deserialize, Serialize};

/// System prompt for the standalone web-search agent.
pub const WEB_SEARCH_PROMPT: &str =
    "You are a web search agent with access to brightdata tool to get latest data.";

/// Orchestration instructions for the supervisor. Heads the merged history
/// of a supervised run.
pub const SUPERVISOR_PROMPT: &str = "You are an orchestrator. Follow this EXACT sequence:\n\
    1. Ask stock_finder_agent to find 2 NSE stocks.\n\
    2. Once you have the tickers, ask market_data_agent to get prices for those SPECIFIC tickers.\n\
    3. Then ask news_analyst_agent for news on those tickers.\n\
    4. Finally, ask price_recommender_agent for the final Buy/Sell advice.\n\
    If an agent returns without data, tell them to try again using their tools.";

const STOCK_FINDER_PROMPT: &str = "You are a stock research analyst specializing in the Indian Stock Market - NSE. \
    Your task is to select 2 promising, actively traded NSE-listed stocks for short term trading (buy/sell) \
    based on recent performance, news buzz, volume or technical strength.\n\
    Avoid penny stocks and illiquid companies.\n\
    Output should include stock names, tickers and brief reasoning for each choice.\n\
    Respond in structured plain text format.";

const MARKET_DATA_PROMPT: &str = "You are a market data analyst for Indian stocks listed on NSE. \
    Given a list of stock tickers (eg RELIANCE, INFY), your task is to gather recent market information \
    for each stock, including:\n\
    - Current price\n\
    - Previous closing price\n\
    - Today's volume\n\
    - 7-day and 30-day price trend\n\
    - Basic Technical indicators (RSI, 50/200-day moving averages)\n\
    - Any notable spikes in volume or volatility\n\n\
    Return your findings in a structured and readable format for each stock, suitable for further \
    analysis by a recommendation engine. Use INR as the currency. Be concise but complete.";

const NEWS_ANALYST_PROMPT: &str = "You are a financial news analyst. Given the names or the tickers \
    of Indian NSE listed stocks, your job is to-\n\
    - Search for the most recent news articles (past 3-5 days)\n\
    - Summarize key updates, announcements, and events for each stock\n\
    - Classify each piece of news as positive, negative or neutral\n\
    - Highlight how the news might affect short term stock price\n\n\
    Present your response in a clear, structured format - one section per stock.\n\n\
    Use bullet points where necessary. Keep it short, factual and analysis-oriented";

const PRICE_RECOMMENDER_PROMPT: &str = "You are a trading strategy advisor for the Indian Stock Market. \
    You are given -\n\
    - Recent market data (current price, volume, trend, indicators)\n\
    - News summaries and sentiment for each stock\n\n\
    Based on this info, for each stock-\n\
    1. Recommend an action : Buy, Sell or Hold\n\
    2. Suggest a specific target price for entry or exit (INR)\n\
    3. Briefly explain the reason behind your recommendation.\n\n\
    Your goal is to provide practical, near-term trading advice for the next trading day.\n\n\
    Keep the response concise and clearly structured.";

/// The four specialised agents of a supervised run, in plan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentRole {
    StockFinder,
    MarketData,
    NewsAnalyst,
    PriceRecommender,
}

impl AgentRole {
    /// The fixed execution order.
    pub const PLAN: [AgentRole; 4] = [
        AgentRole::StockFinder,
        AgentRole::MarketData,
        AgentRole::NewsAnalyst,
        AgentRole::PriceRecommender,
    ];

    /// Agent name used in handoffs, namespaces, and update nodes.
    pub fn label(&self) -> &'static str {
        match self {
            AgentRole::StockFinder => "stock_finder_agent",
            AgentRole::MarketData => "market_data_agent",
            AgentRole::NewsAnalyst => "news_analyst_agent",
            AgentRole::PriceRecommender => "price_recommender_agent",
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            AgentRole::StockFinder => STOCK_FINDER_PROMPT,
            AgentRole::MarketData => MARKET_DATA_PROMPT,
            AgentRole::NewsAnalyst => NEWS_ANALYST_PROMPT,
            AgentRole::PriceRecommender => PRICE_RECOMMENDER_PROMPT,
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
