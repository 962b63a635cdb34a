//! Search plan produced by the query planner and executed by the pipeline.

use serde::{Deserialize, Serialize};

/// Result ordering requested by the user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortType {
    #[default]
    MostRecent,
    Relevance,
}

/// How much of a paper the summarizer sees
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SummaryDepth {
    #[serde(rename = "abstract")]
    Abstract,
    #[default]
    #[serde(rename = "abstract+intro+conclusion")]
    AbstractIntroConclusion,
    #[serde(rename = "full")]
    Full,
}

/// Controls whether and how the summarization step runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub depth: SummaryDepth,

    /// Approximate token budget for the text handed to the summarizer
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            depth: SummaryDepth::default(),
            max_tokens: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// User-intent filters extracted from the query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub topic: Option<String>,

    #[serde(default)]
    pub author: Option<String>,

    /// Inclusive lower bound, `YYYY-MM-DD`
    #[serde(default)]
    pub date_from: Option<String>,

    /// Inclusive upper bound, `YYYY-MM-DD`
    #[serde(default)]
    pub date_to: Option<String>,
}

impl SearchFilters {
    /// Topic, if present and not blank
    pub fn topic(&self) -> Option<&str> {
        non_blank(self.topic.as_deref())
    }

    /// Author, if present and not blank
    pub fn author(&self) -> Option<&str> {
        non_blank(self.author.as_deref())
    }

    /// Whether a publication date falls inside the date range.
    ///
    /// Dates compare on their `YYYY-MM-DD` prefix. Undated papers are admitted.
    pub fn admits(&self, published: &str) -> bool {
        let day = published.get(..10).unwrap_or(published);
        if day.is_empty() {
            return true;
        }
        let after_start = non_blank(self.date_from.as_deref()).map_or(true, |from| day >= from);
        let before_end = non_blank(self.date_to.as_deref()).map_or(true, |to| day <= to);
        after_start && before_end
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// The plan object executed by the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPlan {
    #[serde(default = "default_intent")]
    pub intent: String,

    #[serde(default = "default_source")]
    pub source: String,

    #[serde(default)]
    pub filters: SearchFilters,

    #[serde(default)]
    pub sort: SortType,

    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default)]
    pub summarization: SummarizationConfig,

    /// The natural-language query the plan was derived from
    #[serde(default)]
    pub raw_query: String,
}

fn default_intent() -> String {
    "search_papers".to_string()
}

fn default_source() -> String {
    "arxiv".to_string()
}

fn default_limit() -> usize {
    5
}

impl Default for SearchPlan {
    fn default() -> Self {
        Self {
            intent: default_intent(),
            source: default_source(),
            filters: SearchFilters::default(),
            sort: SortType::default(),
            limit: default_limit(),
            summarization: SummarizationConfig::default(),
            raw_query: String::new(),
        }
    }
}

impl SearchPlan {
    /// Create a plan for a raw query with default settings
    pub fn new(raw_query: impl Into<String>) -> Self {
        Self {
            raw_query: raw_query.into(),
            ..Default::default()
        }
    }

    /// Set topic filter
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.filters.topic = Some(topic.into());
        self
    }

    /// Set author filter
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.filters.author = Some(author.into());
        self
    }

    /// Set sort order
    pub fn sort(mut self, sort: SortType) -> Self {
        self.sort = sort;
        self
    }

    /// Set maximum number of papers
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set summarization depth
    pub fn depth(mut self, depth: SummaryDepth) -> Self {
        self.summarization.depth = depth;
        self
    }

    /// Disable the summarization step
    pub fn without_summaries(mut self) -> Self {
        self.summarization.enabled = false;
        self
    }
}
