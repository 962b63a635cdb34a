//! LLM-produced paper summaries.

use serde::{Deserialize, Serialize};

/// Placeholder used in every semantic field of a fallback summary
pub const SENTINEL: &str = "N/A";

/// Single tldr line of a fallback summary
pub const FALLBACK_TLDR: &str =
    "The summarizer response could not be parsed; see the raw output.";

/// Structured summary fields plus the verbatim model output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub tldr: Vec<String>,
    pub problem: String,
    pub method: String,
    pub results: String,
    pub limitations: String,
    pub future_work: String,
    pub raw_text: String,
}

impl SummaryRecord {
    /// A record holding sentinels and the original response
    pub fn placeholder(raw_text: impl Into<String>) -> Self {
        Self {
            tldr: vec![FALLBACK_TLDR.to_string()],
            problem: SENTINEL.to_string(),
            method: SENTINEL.to_string(),
            results: SENTINEL.to_string(),
            limitations: SENTINEL.to_string(),
            future_work: SENTINEL.to_string(),
            raw_text: raw_text.into(),
        }
    }
}

/// A summary, either parsed from structured model output or a fallback
/// carrying only the raw text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Summary {
    Structured(SummaryRecord),
    Fallback(SummaryRecord),
}

impl Summary {
    /// Build the fallback variant for an unparseable response
    pub fn fallback(raw_text: impl Into<String>) -> Self {
        Self::Fallback(SummaryRecord::placeholder(raw_text))
    }

    pub fn record(&self) -> &SummaryRecord {
        match self {
            Self::Structured(record) | Self::Fallback(record) => record,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    /// The model output the summary was derived from
    pub fn raw_text(&self) -> &str {
        &self.record().raw_text
    }
}
