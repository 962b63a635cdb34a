//! From a natural-language query to summarized papers.
//!
//! [`QueryPlanner`] turns the query into a [`SearchPlan`](crate::models::SearchPlan),
//! [`PlanExecutor`] fetches and summarizes the papers, and [`ResearchAgent`]
//! runs both in sequence.

mod agent;
mod executor;
pub mod extract;
mod planner;
pub mod prompts;

pub use agent::ResearchAgent;
pub use executor::{PlanExecutor, DEFAULT_MAX_CONCURRENCY};
pub use extract::{extract_summary, find_json_candidate};
pub use planner::{parse_plan, QueryPlanner};

use crate::llm::LlmError;
use crate::sources::SourceError;

/// Errors that stop a whole query
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("planning failed: {0}")]
    Planning(#[from] PlanError),

    #[error("paper search failed: {0}")]
    Fetch(#[from] SourceError),
}

/// Errors turning a query into a plan
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("planner LLM failed: {0}")]
    Llm(#[from] LlmError),

    #[error("planner response contains no JSON object")]
    NoJson,

    #[error("invalid plan: {0}")]
    Invalid(String),
}
