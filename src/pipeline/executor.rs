//! Fetch the papers of a plan and summarize them concurrently.

use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::extract::extract_summary;
use super::prompts::summary_messages;
use super::PipelineError;
use crate::llm::{LlmClient, LlmError};
use crate::models::{PaperContent, PaperMeta, ProcessingOutcome, SearchPlan, Summary};
use crate::sources::{PaperSource, SourceError};

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Failure processing a single paper; becomes the outcome's reason
#[derive(Debug, thiserror::Error)]
enum PaperError {
    #[error("read failed: {0}")]
    Read(#[from] SourceError),

    #[error("summarization failed: {0}")]
    Summarize(#[from] LlmError),
}

/// Executes search plans against a paper source and a summarizer
pub struct PlanExecutor {
    source: Arc<dyn PaperSource>,
    summarizer: Arc<dyn LlmClient>,
    max_concurrency: usize,
}

impl PlanExecutor {
    pub fn new(source: Arc<dyn PaperSource>, summarizer: Arc<dyn LlmClient>) -> Self {
        Self {
            source,
            summarizer,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Limit the number of papers processed at once (at least one)
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run a plan.
    ///
    /// Only a failed search is an error. Every paper found yields exactly one
    /// outcome, in search order; a paper whose read or summary fails (or
    /// whose task panics) comes back as metadata with the failure reason.
    pub async fn execute(&self, plan: &SearchPlan) -> Result<Vec<ProcessingOutcome>, PipelineError> {
        info!(
            "Executing plan from source '{}' for query '{}'",
            self.source.id(),
            plan.raw_query
        );
        if let Ok(json) = serde_json::to_string(plan) {
            debug!("Plan: {}", json);
        }

        let metas = self.source.search_papers(plan).await?;
        info!("Search returned {} papers", metas.len());

        if !plan.summarization.enabled {
            return Ok(metas.into_iter().map(ProcessingOutcome::meta_only).collect());
        }

        let plan = Arc::new(plan.clone());
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        let (metas, handles): (Vec<_>, Vec<_>) = metas
            .into_iter()
            .map(|meta| {
                let task = process_paper(
                    self.source.clone(),
                    self.summarizer.clone(),
                    plan.clone(),
                    semaphore.clone(),
                    meta.clone(),
                );
                (meta, tokio::spawn(task))
            })
            .unzip();

        let outcomes = metas
            .into_iter()
            .zip(join_all(handles).await)
            .map(|(meta, joined)| match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Processing task for paper {} failed: {}", meta.id, e);
                    ProcessingOutcome::degraded(meta, format!("processing task failed: {}", e))
                }
            })
            .collect();

        Ok(outcomes)
    }
}

async fn process_paper(
    source: Arc<dyn PaperSource>,
    summarizer: Arc<dyn LlmClient>,
    plan: Arc<SearchPlan>,
    semaphore: Arc<Semaphore>,
    meta: PaperMeta,
) -> ProcessingOutcome {
    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => return ProcessingOutcome::degraded(meta, e.to_string()),
    };

    match summarize_paper(source.as_ref(), summarizer.as_ref(), &plan, &meta).await {
        Ok((content, summary)) => {
            if summary.is_fallback() {
                debug!("Summary of paper {} fell back to raw text", meta.id);
            }
            ProcessingOutcome::complete(meta, content, summary)
        }
        Err(e) => {
            debug!("Failed to process paper {}: {}", meta.id, e);
            ProcessingOutcome::degraded(meta, e.to_string())
        }
    }
}

async fn summarize_paper(
    source: &dyn PaperSource,
    summarizer: &dyn LlmClient,
    plan: &SearchPlan,
    meta: &PaperMeta,
) -> Result<(PaperContent, Summary), PaperError> {
    let content = source.read_paper(&meta.id).await?;
    let messages = summary_messages(meta, &content, &plan.summarization);
    let response = summarizer.chat(&messages).await?;
    Ok((content, extract_summary(&response)))
}
