//! Paper records produced by a paper source and consumed by the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::Summary;

/// Metadata for a single paper as returned by a paper source.
///
/// Built once through [`PaperMetaBuilder`] and not mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperMeta {
    /// arXiv identifier without a version suffix (e.g. `2301.00001`)
    pub id: String,

    /// Paper title
    pub title: String,

    /// Authors in publication order
    pub authors: Vec<String>,

    /// Subject categories (e.g. `cs.LG`)
    pub categories: BTreeSet<String>,

    /// Publication date as reported by the source (ISO format when known)
    pub published: String,

    /// Abstract text
    pub r#abstract: Option<String>,

    /// Direct PDF URL
    pub pdf_url: Option<String>,
}

impl PaperMeta {
    /// Authors joined for display in prompts
    pub fn author_line(&self) -> String {
        self.authors.join(", ")
    }

    /// The abstract, or an empty string when the source had none
    pub fn abstract_text(&self) -> &str {
        self.r#abstract.as_deref().unwrap_or("")
    }
}

/// Builder for constructing [`PaperMeta`] values
#[derive(Debug, Clone)]
pub struct PaperMetaBuilder {
    meta: PaperMeta,
}

impl PaperMetaBuilder {
    /// Create a new builder with the required identifier and title
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            meta: PaperMeta {
                id: id.into(),
                title: title.into(),
                authors: Vec::new(),
                categories: BTreeSet::new(),
                published: String::new(),
                r#abstract: None,
                pdf_url: None,
            },
        }
    }

    /// Set authors
    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.meta.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    /// Set categories
    pub fn categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.meta.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    /// Set publication date
    pub fn published(mut self, date: impl Into<String>) -> Self {
        self.meta.published = date.into();
        self
    }

    /// Set abstract; empty text is treated as absent
    pub fn abstract_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.meta.r#abstract = (!text.trim().is_empty()).then_some(text);
        self
    }

    /// Set PDF URL; empty text is treated as absent
    pub fn pdf_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.meta.pdf_url = (!url.trim().is_empty()).then_some(url);
        self
    }

    /// Build the metadata record
    pub fn build(self) -> PaperMeta {
        self.meta
    }
}

/// Extracted textual content of a paper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperContent {
    /// Full text as returned by the source
    pub full_text: String,

    /// Named sections keyed by lowercase heading (e.g. `introduction`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sections: BTreeMap<String, String>,
}

impl PaperContent {
    /// Content with no section breakdown
    pub fn new(full_text: impl Into<String>) -> Self {
        Self {
            full_text: full_text.into(),
            sections: BTreeMap::new(),
        }
    }

    /// Build content from markdown text, splitting sections on `#` headings.
    ///
    /// Heading text is lowercased and stripped of leading numbering, so
    /// `## 1 Introduction` is stored as `introduction`. Repeated headings
    /// keep the first occurrence.
    pub fn from_markdown(text: impl Into<String>) -> Self {
        let full_text = text.into();
        let mut sections = BTreeMap::new();
        let mut current: Option<(String, Vec<&str>)> = None;

        for line in full_text.lines() {
            if let Some(heading) = markdown_heading(line) {
                if let Some((name, body)) = current.take() {
                    sections.entry(name).or_insert_with(|| body.join("\n").trim().to_string());
                }
                current = Some((heading, Vec::new()));
            } else if let Some((_, body)) = current.as_mut() {
                body.push(line);
            }
        }
        if let Some((name, body)) = current {
            sections.entry(name).or_insert_with(|| body.join("\n").trim().to_string());
        }
        sections.retain(|_, body: &mut String| !body.is_empty());

        Self {
            full_text,
            sections,
        }
    }

    /// Look up a section by name, case-insensitively
    pub fn section(&self, name: &str) -> Option<&str> {
        self.sections
            .get(&name.to_lowercase())
            .map(String::as_str)
    }
}

fn markdown_heading(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let rest = trimmed.strip_prefix('#')?;
    let rest = rest.trim_start_matches('#');
    if !rest.starts_with(' ') {
        return None;
    }
    let name = rest
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.')
        .trim()
        .to_lowercase();
    (!name.is_empty()).then_some(name)
}

/// Result of processing one paper in a plan execution.
///
/// `MetaOnly` covers both "summarization disabled" (`reason` is `None`) and
/// degraded processing, where `reason` carries the failure text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    Complete {
        meta: PaperMeta,
        content: PaperContent,
        summary: Summary,
    },
    MetaOnly {
        meta: PaperMeta,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl ProcessingOutcome {
    /// A fully processed paper
    pub fn complete(meta: PaperMeta, content: PaperContent, summary: Summary) -> Self {
        Self::Complete {
            meta,
            content,
            summary,
        }
    }

    /// Metadata only, with no failure attached
    pub fn meta_only(meta: PaperMeta) -> Self {
        Self::MetaOnly { meta, reason: None }
    }

    /// Metadata only because processing failed
    pub fn degraded(meta: PaperMeta, reason: impl Into<String>) -> Self {
        Self::MetaOnly {
            meta,
            reason: Some(reason.into()),
        }
    }

    pub fn meta(&self) -> &PaperMeta {
        match self {
            Self::Complete { meta, .. } | Self::MetaOnly { meta, .. } => meta,
        }
    }

    pub fn content(&self) -> Option<&PaperContent> {
        match self {
            Self::Complete { content, .. } => Some(content),
            Self::MetaOnly { .. } => None,
        }
    }

    pub fn summary(&self) -> Option<&Summary> {
        match self {
            Self::Complete { summary, .. } => Some(summary),
            Self::MetaOnly { .. } => None,
        }
    }

    /// Failure text when processing was attempted and failed
    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::MetaOnly { reason, .. } => reason.as_deref(),
            Self::Complete { .. } => None,
        }
    }
}
