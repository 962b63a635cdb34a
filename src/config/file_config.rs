//! Configuration file discovery and generation.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! command = "uv tool run arxiv-mcp-server"
//! args = []
//! storage_path = "~/.summx/papers"
//! startup_grace_ms = 2000
//! shutdown_timeout_ms = 5000
//!
//! [llm]
//! planner_provider = "openai"
//! planner_model = "gpt-4o-mini"
//! summarizer_provider = "groq"
//! summarizer_model = "llama3-8b-8192"
//! request_timeout_secs = 60
//!
//! [pipeline]
//! max_concurrency = 4
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```
//!
//! API keys are read from `OPENAI_API_KEY` and `GROQ_API_KEY` and never
//! written to the file.

use std::path::{Path, PathBuf};

use super::Config;

/// File name looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "summx.toml";

/// `<config_dir>/summx/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("summx").join("config.toml"))
}

/// First existing config file: `./summx.toml`, then the user config path
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    default_config_path().filter(|path| path.is_file())
}

/// Write the default configuration as TOML.
///
/// Refuses to replace an existing file unless `force` is set.
pub fn write_default_config(path: &Path, force: bool) -> Result<(), ConfigFileError> {
    if path.exists() && !force {
        return Err(ConfigFileError::Exists(path.to_path_buf()));
    }

    let content = toml::to_string_pretty(&Config::default())
        .map_err(|e| ConfigFileError::Serialize(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigFileError::Io(e.to_string()))?;
    }
    std::fs::write(path, content).map_err(|e| ConfigFileError::Io(e.to_string()))
}

/// Configuration file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("{} already exists (use --force to overwrite)", .0.display())]
    Exists(PathBuf),
}
