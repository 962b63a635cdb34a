//! Core data models for papers, plans and summaries.

mod paper;
mod plan;
mod summary;

pub use paper::{PaperContent, PaperMeta, PaperMetaBuilder, ProcessingOutcome};
pub use plan::{SearchFilters, SearchPlan, SortType, SummarizationConfig, SummaryDepth};
pub use summary::{Summary, SummaryRecord, FALLBACK_TLDR, SENTINEL};
