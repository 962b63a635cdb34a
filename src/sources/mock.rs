//! Mock source for testing purposes.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::models::{PaperContent, PaperMeta, PaperMetaBuilder, SearchPlan};
use crate::sources::{PaperSource, SourceError};

/// A mock source for testing that returns predefined papers.
///
/// Reads return the paper's abstract as content unless the id was marked
/// as failing. Optional per-id delays make completion order differ from
/// search order, and the peak number of overlapping reads is tracked.
#[derive(Debug, Default)]
pub struct MockSource {
    papers: Mutex<Vec<PaperMeta>>,
    search_error: Mutex<Option<String>>,
    failing_reads: Mutex<HashSet<String>>,
    panicking_reads: Mutex<HashSet<String>>,
    read_delays: Mutex<HashMap<String, Duration>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    reads: AtomicUsize,
}

impl MockSource {
    /// Create a new mock source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock source returning `papers` from every search.
    pub fn with_papers(papers: Vec<PaperMeta>) -> Self {
        let source = Self::new();
        source.set_papers(papers);
        source
    }

    /// Set the papers returned by search.
    pub fn set_papers(&self, papers: Vec<PaperMeta>) {
        *self.papers.lock().unwrap() = papers;
    }

    /// Make every search fail with `message`.
    pub fn fail_search(&self, message: &str) {
        *self.search_error.lock().unwrap() = Some(message.to_string());
    }

    /// Make reads of `paper_id` fail.
    pub fn fail_read(&self, paper_id: &str) {
        self.failing_reads
            .lock()
            .unwrap()
            .insert(paper_id.to_string());
    }

    /// Make reads of `paper_id` panic.
    pub fn panic_on_read(&self, paper_id: &str) {
        self.panicking_reads
            .lock()
            .unwrap()
            .insert(paper_id.to_string());
    }

    /// Delay reads of `paper_id`.
    pub fn delay_read(&self, paper_id: &str, delay: Duration) {
        self.read_delays
            .lock()
            .unwrap()
            .insert(paper_id.to_string(), delay);
    }

    /// Highest number of reads observed running at the same time.
    pub fn peak_concurrent_reads(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Number of reads started.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaperSource for MockSource {
    fn id(&self) -> &str {
        "mock"
    }

    async fn search_papers(&self, plan: &SearchPlan) -> Result<Vec<PaperMeta>, SourceError> {
        if let Some(message) = self.search_error.lock().unwrap().clone() {
            return Err(SourceError::Other(message));
        }
        let papers = self.papers.lock().unwrap();
        Ok(papers.iter().take(plan.limit).cloned().collect())
    }

    async fn read_paper(&self, paper_id: &str) -> Result<PaperContent, SourceError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.read_delays.lock().unwrap().get(paper_id).copied();
        tokio::time::sleep(delay.unwrap_or(Duration::from_millis(5))).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panicking_reads.lock().unwrap().contains(paper_id) {
            panic!("mock read of {} panicked", paper_id);
        }
        if self.failing_reads.lock().unwrap().contains(paper_id) {
            return Err(SourceError::ContentUnavailable(paper_id.to_string()));
        }

        let papers = self.papers.lock().unwrap();
        let paper = papers
            .iter()
            .find(|p| p.id == paper_id)
            .ok_or_else(|| SourceError::NotFound(paper_id.to_string()))?;
        Ok(PaperContent::from_markdown(format!(
            "# Abstract\n{}\n\n# Introduction\nIntroduction of {}.\n\n# Conclusion\nConclusion of {}.",
            paper.abstract_text(),
            paper.title,
            paper.title
        )))
    }
}

/// Helper function to create a mock paper for testing.
pub fn make_paper(paper_id: &str, title: &str) -> PaperMeta {
    PaperMetaBuilder::new(paper_id, title)
        .authors(["Test Author"])
        .categories(["cs.LG"])
        .published("2024-01-15")
        .abstract_text(format!("Abstract of {}.", title))
        .pdf_url(format!("https://arxiv.org/pdf/{}", paper_id))
        .build()
}
