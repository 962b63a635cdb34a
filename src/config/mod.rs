//! Configuration management.
//!
//! Values come from, in increasing priority: built-in defaults, a TOML file,
//! and `SUMMX_`-prefixed environment variables using `__` between sections
//! and keys (`SUMMX_PIPELINE__MAX_CONCURRENCY=8`).

mod file_config;

pub use file_config::{
    default_config_path, find_config_file, write_default_config, ConfigFileError,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::llm::LlmProvider;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "SUMMX";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Tool server process
    #[serde(default)]
    pub server: ServerConfig,

    /// Planner and summarizer models
    #[serde(default)]
    pub llm: LlmConfig,

    /// Execution pipeline
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How to launch the tool server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Command line, split with shell quoting rules
    #[serde(default = "default_server_command")]
    pub command: String,

    /// Extra arguments appended after the command
    #[serde(default)]
    pub args: Vec<String>,

    /// Where the server keeps downloaded papers (`--storage-path`)
    #[serde(default = "default_storage_path")]
    pub storage_path: Option<PathBuf>,

    #[serde(default = "default_startup_grace_ms")]
    pub startup_grace_ms: u64,

    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl ServerConfig {
    /// Config for `command` with default timings and no storage path
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            storage_path: None,
            startup_grace_ms: default_startup_grace_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            ..Self::new(default_server_command())
        }
    }
}

fn default_server_command() -> String {
    "uv tool run arxiv-mcp-server".to_string()
}

fn default_storage_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".summx").join("papers"))
}

fn default_startup_grace_ms() -> u64 {
    2000
}

fn default_shutdown_timeout_ms() -> u64 {
    5000
}

/// LLM providers, models and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_planner_provider")]
    pub planner_provider: LlmProvider,

    #[serde(default = "default_planner_model")]
    pub planner_model: String,

    #[serde(default = "default_summarizer_provider")]
    pub summarizer_provider: LlmProvider,

    #[serde(default = "default_summarizer_model")]
    pub summarizer_model: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Attempts per request when the provider fails transiently
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Canned reply of the `static` provider
    #[serde(default)]
    pub static_response: Option<String>,

    /// OpenAI API key (defaults to `OPENAI_API_KEY`)
    #[serde(default = "env_openai_key", skip_serializing)]
    pub openai_api_key: Option<String>,

    /// Groq API key (defaults to `GROQ_API_KEY`)
    #[serde(default = "env_groq_key", skip_serializing)]
    pub groq_api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            planner_provider: default_planner_provider(),
            planner_model: default_planner_model(),
            summarizer_provider: default_summarizer_provider(),
            summarizer_model: default_summarizer_model(),
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            static_response: None,
            openai_api_key: env_openai_key(),
            groq_api_key: env_groq_key(),
        }
    }
}

impl LlmConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_planner_provider() -> LlmProvider {
    LlmProvider::OpenAi
}

fn default_planner_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_summarizer_provider() -> LlmProvider {
    LlmProvider::Groq
}

fn default_summarizer_model() -> String {
    "llama3-8b-8192".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn env_openai_key() -> Option<String> {
    non_empty_env("OPENAI_API_KEY")
}

fn env_groq_key() -> Option<String> {
    non_empty_env("GROQ_API_KEY")
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Execution pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Papers processed at the same time
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl PipelineConfig {
    /// Worker limit, never below one
    pub fn worker_limit(&self) -> usize {
        self.max_concurrency.max(1)
    }
}

fn default_max_concurrency() -> usize {
    4
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from `path`, or from the first config file found
    /// in the default locations, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file(),
        };
        Self::load_from(file.as_deref(), environment())
    }

    fn load_from(
        file: Option<&Path>,
        env: config::Environment,
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(file) = file {
            tracing::debug!("Loading config from {}", file.display());
            builder = builder.add_source(config::File::from(file));
        }
        let mut loaded: Config = builder.add_source(env).build()?.try_deserialize()?;

        loaded.server.storage_path = loaded.server.storage_path.map(expand_home);
        Ok(loaded)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// Replace a leading `~` with the home directory
fn expand_home(path: PathBuf) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path,
    }
}
