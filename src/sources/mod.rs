//! Paper sources.
//!
//! The execution pipeline only sees the [`PaperSource`] trait. The production
//! implementation is [`ArxivToolGateway`], which turns search and read
//! requests into tool calls on an arXiv MCP server. [`MockSource`] serves
//! canned papers to tests.

mod arxiv;
pub mod mock;

pub use arxiv::{normalize_arxiv_id, ArxivToolGateway};
pub use mock::MockSource;

use async_trait::async_trait;

use crate::mcp::McpError;
use crate::models::{PaperContent, PaperMeta, SearchPlan};

/// A place papers can be searched and read from
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// Short identifier used in logs
    fn id(&self) -> &str;

    /// Metadata for the papers matching the plan's filters, sort and limit
    async fn search_papers(&self, plan: &SearchPlan) -> Result<Vec<PaperMeta>, SourceError>;

    /// Full text of one paper
    async fn read_paper(&self, paper_id: &str) -> Result<PaperContent, SourceError>;
}

/// Errors that can occur when interacting with a source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The tool server call failed
    #[error("MCP error: {0}")]
    Mcp(#[from] McpError),

    /// The tool returned a payload of an unexpected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// The paper exists but its content could not be retrieved
    #[error("Content unavailable for paper {0}")]
    ContentUnavailable(String),

    /// Paper not found
    #[error("Paper not found: {0}")]
    NotFound(String),

    /// Other error
    #[error("Error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}
