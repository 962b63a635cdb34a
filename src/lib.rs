//! # SummX
//!
//! Search arXiv through an MCP tool server and summarize the papers with an LLM.
//!
//! ## Architecture
//!
//! - [`mcp`]: tool server process session and JSON-RPC client
//! - [`sources`]: paper sources, including the arXiv tool gateway
//! - [`llm`]: chat clients for the planner and the summarizer
//! - [`pipeline`]: query planning, plan execution and summary extraction
//! - [`models`]: papers, plans and summaries
//! - [`config`]: configuration loading
//! - [`utils`]: HTTP client and retry helpers

pub mod config;
pub mod llm;
pub mod mcp;
pub mod models;
pub mod pipeline;
pub mod sources;
pub mod utils;

pub use models::{PaperMeta, ProcessingOutcome, SearchPlan, Summary};
pub use pipeline::{PlanExecutor, QueryPlanner, ResearchAgent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
