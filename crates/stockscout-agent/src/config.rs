// ABOUTME: Configuration loading and validation for stockscout runs.
// ABOUTME: Reads environment variables into explicit structs handed to each component.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_PROVIDER: &str = "gemini";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_MAX_ITERATIONS: usize = 25;
pub const DEFAULT_EMPTY_STEP_RETRIES: u32 = 1;
pub const DEFAULT_TOOL_COMMAND: &str = "npx";
pub const DEFAULT_TOOL_ARGS: &str = "@brightdata/mcp";
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{var} has an invalid value: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Settings for the hosted chat model.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub provider: String,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// `None` leaves output length to the provider.
    pub max_output_tokens: Option<u32>,
    /// `None` means requests never time out.
    pub request_timeout: Option<Duration>,
    /// Retries on top of the first attempt for transient failures.
    pub max_retries: u32,
    /// First retry delay; doubled on each further attempt.
    pub retry_base_delay: Duration,
}

impl ModelConfig {
    /// A config with the observed defaults and the given key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            api_key: api_key.into(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: None,
            request_timeout: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// How to launch the external tool-serving process.
#[derive(Debug, Clone)]
pub struct ToolProviderConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    /// Extra environment for the child process.
    pub env: BTreeMap<String, String>,
    pub protocol_version: String,
    /// Bound on the initialize and tools/list round trips.
    pub handshake_timeout: Duration,
}

impl ToolProviderConfig {
    /// The Bright Data MCP server launched through npx, authenticated with `api_token`.
    pub fn bright_data(api_token: impl Into<String>) -> Self {
        let mut env = BTreeMap::new();
        env.insert("API_TOKEN".to_string(), api_token.into());
        Self {
            name: "bright_data".to_string(),
            command: DEFAULT_TOOL_COMMAND.to_string(),
            args: vec![DEFAULT_TOOL_ARGS.to_string()],
            env,
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            handshake_timeout: Duration::from_secs(60),
        }
    }
}

/// Limits applied to agent runs.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Model calls allowed per agent run before it fails.
    pub max_iterations: usize,
    /// Extra attempts the supervisor gives a step that returned without data.
    pub empty_step_retries: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            empty_step_retries: DEFAULT_EMPTY_STEP_RETRIES,
        }
    }
}

/// Everything a run needs, loaded once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub tool_provider: ToolProviderConfig,
    pub run: RunConfig,
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty_var(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var: name,
            value: raw,
        }),
        None => Ok(default),
    }
}

impl AppConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - GEMINI_API_KEY (or GOOGLE_API_KEY): model provider credential (required)
    /// - BRIGHT_DATA_API_KEY: tool provider credential, forwarded as API_TOKEN (required)
    /// - STOCKSCOUT_PROVIDER: model provider (default: gemini)
    /// - STOCKSCOUT_MODEL: model name (default: gemini-2.5-flash)
    /// - GEMINI_BASE_URL: API base URL (default: https://generativelanguage.googleapis.com)
    /// - STOCKSCOUT_TEMPERATURE: sampling temperature (default: 0.2)
    /// - STOCKSCOUT_MAX_RETRIES: retries on transient failures (default: 2)
    /// - STOCKSCOUT_MAX_ITERATIONS: model calls per agent run (default: 25)
    /// - STOCKSCOUT_EMPTY_STEP_RETRIES: supervisor retries for empty steps (default: 1)
    /// - STOCKSCOUT_TOOL_COMMAND: tool server launcher (default: npx)
    /// - STOCKSCOUT_TOOL_ARGS: whitespace-separated launcher args (default: @brightdata/mcp)
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = non_empty_var("GEMINI_API_KEY")
            .or_else(|| non_empty_var("GOOGLE_API_KEY"))
            .ok_or(ConfigError::Missing("GEMINI_API_KEY"))?;

        let bright_data_key =
            non_empty_var("BRIGHT_DATA_API_KEY").ok_or(ConfigError::Missing("BRIGHT_DATA_API_KEY"))?;

        let mut model = ModelConfig::new(api_key);
        if let Some(provider) = non_empty_var("STOCKSCOUT_PROVIDER") {
            model.provider = provider;
        }
        if let Some(name) = non_empty_var("STOCKSCOUT_MODEL") {
            model.model = name;
        }
        if let Some(base_url) = non_empty_var("GEMINI_BASE_URL") {
            model.base_url = base_url.trim_end_matches('/').to_string();
        }
        model.temperature = parse_var("STOCKSCOUT_TEMPERATURE", DEFAULT_TEMPERATURE)?;
        if !(0.0..=2.0).contains(&model.temperature) {
            return Err(ConfigError::Invalid {
                var: "STOCKSCOUT_TEMPERATURE",
                value: model.temperature.to_string(),
            });
        }
        model.max_retries = parse_var("STOCKSCOUT_MAX_RETRIES", DEFAULT_MAX_RETRIES)?;

        let mut tool_provider = ToolProviderConfig::bright_data(bright_data_key);
        if let Some(command) = non_empty_var("STOCKSCOUT_TOOL_COMMAND") {
            tool_provider.command = command;
        }
        if let Some(args) = non_empty_var("STOCKSCOUT_TOOL_ARGS") {
            tool_provider.args = args.split_whitespace().map(String::from).collect();
        }

        let run = RunConfig {
            max_iterations: parse_var("STOCKSCOUT_MAX_ITERATIONS", DEFAULT_MAX_ITERATIONS)?,
            empty_step_retries: parse_var(
                "STOCKSCOUT_EMPTY_STEP_RETRIES",
                DEFAULT_EMPTY_STEP_RETRIES,
            )?,
        };
        if run.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                var: "STOCKSCOUT_MAX_ITERATIONS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            model,
            tool_provider,
            run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serialize all tests that read/write env vars to prevent race conditions.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "GEMINI_API_KEY",
        "GOOGLE_API_KEY",
        "BRIGHT_DATA_API_KEY",
        "STOCKSCOUT_PROVIDER",
        "STOCKSCOUT_MODEL",
        "GEMINI_BASE_URL",
        "STOCKSCOUT_TEMPERATURE",
        "STOCKSCOUT_MAX_RETRIES",
        "STOCKSCOUT_MAX_ITERATIONS",
        "STOCKSCOUT_EMPTY_STEP_RETRIES",
        "STOCKSCOUT_TOOL_COMMAND",
        "STOCKSCOUT_TOOL_ARGS",
    ];

    fn clear_env() {
        // SAFETY: test-only code, serialized by ENV_MUTEX
        unsafe {
            for var in VARS {
                std::env::remove_var(var);
            }
        }
    }

    #[test]
    fn config_loads_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        // SAFETY: test-only code, serialized by ENV_MUTEX
        unsafe {
            std::env::set_var("GEMINI_API_KEY", "gemini-test-key");
            std::env::set_var("BRIGHT_DATA_API_KEY", "bd-test-key");
        }

        let config = AppConfig::from_env();
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.model.provider, "gemini");
        assert_eq!(config.model.model, "gemini-2.5-flash");
        assert_eq!(config.model.api_key, "gemini-test-key");
        assert_eq!(config.model.temperature, 0.2);
        assert_eq!(config.model.max_retries, 2);
        assert!(config.model.max_output_tokens.is_none());
        assert!(config.model.request_timeout.is_none());

        assert_eq!(config.tool_provider.command, "npx");
        assert_eq!(config.tool_provider.args, vec!["@brightdata/mcp".to_string()]);
        assert_eq!(
            config.tool_provider.env.get("API_TOKEN").map(String::as_str),
            Some("bd-test-key")
        );

        assert_eq!(config.run.max_iterations, 25);
        assert_eq!(config.run.empty_step_retries, 1);
    }

    #[test]
    fn config_requires_model_key() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        // SAFETY: test-only code, serialized by ENV_MUTEX
        unsafe { std::env::set_var("BRIGHT_DATA_API_KEY", "bd-test-key") };

        let result = AppConfig::from_env();
        clear_env();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"), "got: {}", err);
    }

    #[test]
    fn config_requires_tool_provider_key() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        // SAFETY: test-only code, serialized by ENV_MUTEX
        unsafe { std::env::set_var("GOOGLE_API_KEY", "google-fallback") };

        let result = AppConfig::from_env();
        clear_env();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("BRIGHT_DATA_API_KEY"), "got: {}", err);
    }

    #[test]
    fn config_reads_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        // SAFETY: test-only code, serialized by ENV_MUTEX
        unsafe {
            std::env::set_var("GOOGLE_API_KEY", "google-fallback");
            std::env::set_var("BRIGHT_DATA_API_KEY", "bd-test-key");
            std::env::set_var("STOCKSCOUT_MODEL", "gemini-2.0-flash");
            std::env::set_var("GEMINI_BASE_URL", "http://localhost:9999/");
            std::env::set_var("STOCKSCOUT_MAX_RETRIES", "5");
            std::env::set_var("STOCKSCOUT_TOOL_COMMAND", "node");
            std::env::set_var("STOCKSCOUT_TOOL_ARGS", "server.js --stdio");
            std::env::set_var("STOCKSCOUT_EMPTY_STEP_RETRIES", "0");
        }

        let config = AppConfig::from_env();
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.model.api_key, "google-fallback");
        assert_eq!(config.model.model, "gemini-2.0-flash");
        assert_eq!(config.model.base_url, "http://localhost:9999");
        assert_eq!(config.model.max_retries, 5);
        assert_eq!(config.tool_provider.command, "node");
        assert_eq!(config.tool_provider.args, vec!["server.js", "--stdio"]);
        assert_eq!(config.run.empty_step_retries, 0);
    }

    #[test]
    fn config_rejects_invalid_numbers() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        // SAFETY: test-only code, serialized by ENV_MUTEX
        unsafe {
            std::env::set_var("GEMINI_API_KEY", "k");
            std::env::set_var("BRIGHT_DATA_API_KEY", "k");
            std::env::set_var("STOCKSCOUT_TEMPERATURE", "warm");
        }

        let result = AppConfig::from_env();
        clear_env();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("STOCKSCOUT_TEMPERATURE"), "got: {}", err);
    }
}
