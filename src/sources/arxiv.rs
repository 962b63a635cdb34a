//! arXiv papers through the tools of an arXiv MCP server.
//!
//! Tools used:
//! - `search_papers(query, max_results, sort_by_relevance)`
//! - `search_by_author(author_name, max_results)`
//! - `download_paper(arxiv_id)`
//! - `read_paper(paper_id)`

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

use super::{PaperSource, SourceError};
use crate::mcp::{McpError, ToolCaller};
use crate::models::{PaperContent, PaperMeta, PaperMetaBuilder, SearchPlan, SortType};

const SEARCH_PAPERS_TOOL: &str = "search_papers";
const SEARCH_BY_AUTHOR_TOOL: &str = "search_by_author";
const DOWNLOAD_PAPER_TOOL: &str = "download_paper";
const READ_PAPER_TOOL: &str = "read_paper";

/// Strip a trailing version suffix (`v` followed by digits) from an arXiv id.
///
/// `2301.00001v3` becomes `2301.00001`. Ids without a suffix are returned
/// trimmed but otherwise unchanged.
pub fn normalize_arxiv_id(id: &str) -> String {
    let id = id.trim();
    if let Some(pos) = id.rfind('v') {
        let digits = &id[pos + 1..];
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return id[..pos].to_string();
        }
    }
    id.to_string()
}

/// One search result as the server reports it
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ToolPaper {
    #[serde(alias = "id")]
    arxiv_id: Option<String>,
    title: Option<String>,
    authors: Option<Vec<String>>,
    categories: Option<Vec<String>>,
    #[serde(alias = "published")]
    published_date: Option<String>,
    #[serde(alias = "abstract")]
    summary: Option<String>,
    pdf_url: Option<String>,
}

impl ToolPaper {
    fn into_meta(self) -> PaperMeta {
        let id = normalize_arxiv_id(self.arxiv_id.as_deref().unwrap_or_default());
        let mut builder = PaperMetaBuilder::new(id, self.title.unwrap_or_default().trim())
            .authors(self.authors.unwrap_or_default())
            .categories(self.categories.unwrap_or_default())
            .published(self.published_date.unwrap_or_default());
        if let Some(summary) = self.summary {
            builder = builder.abstract_text(summary.trim());
        }
        if let Some(url) = self.pdf_url {
            builder = builder.pdf_url(url);
        }
        builder.build()
    }
}

/// arXiv paper source backed by an MCP tool server
#[derive(Clone)]
pub struct ArxivToolGateway {
    tools: Arc<dyn ToolCaller>,
}

impl std::fmt::Debug for ArxivToolGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArxivToolGateway").finish_non_exhaustive()
    }
}

impl ArxivToolGateway {
    pub fn new(tools: Arc<dyn ToolCaller>) -> Self {
        Self { tools }
    }

    /// Search by topic and/or author.
    ///
    /// An author without a topic goes to the dedicated author search tool.
    pub async fn search(
        &self,
        topic: Option<&str>,
        author: Option<&str>,
        sort: SortType,
        limit: usize,
    ) -> Result<Vec<PaperMeta>, SourceError> {
        let (tool, arguments) = build_search_call(topic, author, sort, limit);
        tracing::info!("Searching arXiv via '{}'", tool);

        let payload = self.call(tool, arguments).await?;
        let Value::Object(mut payload) = payload else {
            return Err(SourceError::Parse(format!(
                "'{}' returned a non-object payload",
                tool
            )));
        };

        let items = match payload.remove("results") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(SourceError::Parse(format!(
                    "'results' is not a list: {}",
                    other
                )))
            }
        };

        let papers: Vec<PaperMeta> = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<ToolPaper>(item) {
                Ok(paper) => Some(paper.into_meta()),
                Err(e) => {
                    tracing::warn!("Skipping malformed search result: {}", e);
                    None
                }
            })
            .collect();
        tracing::debug!("'{}' returned {} papers", tool, papers.len());
        Ok(papers)
    }

    /// Ask the server to download a paper.
    ///
    /// Returns the stored file location, or `None` when the server reports
    /// the download as unsuccessful.
    pub async fn download_paper(&self, paper_id: &str) -> Result<Option<PathBuf>, SourceError> {
        let id = normalize_arxiv_id(paper_id);
        tracing::info!("Requesting download for arXiv ID: {}", id);

        let payload = self
            .call(DOWNLOAD_PAPER_TOOL, arguments([("arxiv_id", json!(id))]))
            .await?;

        let succeeded = payload.get("success").and_then(Value::as_bool) == Some(true)
            || payload.get("status").and_then(Value::as_str) == Some("success");
        if !succeeded {
            tracing::debug!("Download of {} was not successful: {}", id, payload);
            return Ok(None);
        }

        let location = payload
            .get("local_path")
            .or_else(|| payload.get("resource_uri"))
            .and_then(Value::as_str)
            .map(|path| path.strip_prefix("file://").unwrap_or(path))
            .filter(|path| !path.is_empty());
        if location.is_none() {
            tracing::warn!("Server reported a download of {} without a location", id);
        }
        Ok(location.map(PathBuf::from))
    }

    async fn call(&self, tool: &str, arguments: Map<String, Value>) -> Result<Value, SourceError> {
        tracing::debug!(
            "Calling MCP tool '{}' with args: {}",
            tool,
            serde_json::Value::Object(arguments.clone())
        );
        let result = self.tools.call_tool(tool, arguments).await?;
        tool_payload(tool, result)
    }
}

#[async_trait]
impl PaperSource for ArxivToolGateway {
    fn id(&self) -> &str {
        "arxiv"
    }

    async fn search_papers(&self, plan: &SearchPlan) -> Result<Vec<PaperMeta>, SourceError> {
        let filters = &plan.filters;
        let papers = self
            .search(filters.topic(), filters.author(), plan.sort, plan.limit)
            .await?;

        let fetched = papers.len();
        let papers: Vec<PaperMeta> = papers
            .into_iter()
            .filter(|paper| filters.admits(&paper.published))
            .collect();
        if papers.len() < fetched {
            tracing::debug!(
                "Date range removed {} of {} papers",
                fetched - papers.len(),
                fetched
            );
        }
        Ok(papers)
    }

    async fn read_paper(&self, paper_id: &str) -> Result<PaperContent, SourceError> {
        let id = normalize_arxiv_id(paper_id);
        if self.download_paper(&id).await?.is_none() {
            return Err(SourceError::ContentUnavailable(id));
        }

        let payload = self
            .call(READ_PAPER_TOOL, arguments([("paper_id", json!(id))]))
            .await?;

        let text = match payload {
            Value::String(text) => text,
            Value::Object(map) => {
                if map.get("status").and_then(Value::as_str) == Some("error") {
                    tracing::debug!("read_paper failed for {}: {:?}", id, map.get("message"));
                    return Err(SourceError::ContentUnavailable(id));
                }
                map.get("content")
                    .or_else(|| map.get("text"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        SourceError::Parse(format!("'{}' returned no text content", READ_PAPER_TOOL))
                    })?
            }
            other => {
                return Err(SourceError::Parse(format!(
                    "'{}' returned an unexpected payload: {}",
                    READ_PAPER_TOOL, other
                )))
            }
        };

        if text.trim().is_empty() {
            return Err(SourceError::ContentUnavailable(id));
        }
        Ok(PaperContent::from_markdown(text))
    }
}

fn arguments<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Choose the search tool and build its arguments
fn build_search_call(
    topic: Option<&str>,
    author: Option<&str>,
    sort: SortType,
    limit: usize,
) -> (&'static str, Map<String, Value>) {
    let topic = topic.map(str::trim).filter(|t| !t.is_empty());
    let author = author.map(str::trim).filter(|a| !a.is_empty());

    match (topic, author) {
        (None, Some(author)) => (
            SEARCH_BY_AUTHOR_TOOL,
            arguments([
                ("author_name", json!(author)),
                ("max_results", json!(limit)),
            ]),
        ),
        _ => {
            let clauses: Vec<String> = topic
                .map(str::to_string)
                .into_iter()
                .chain(author.map(|a| format!("au:\"{}\"", a)))
                .collect();
            (
                SEARCH_PAPERS_TOOL,
                arguments([
                    ("query", json!(clauses.join(" AND "))),
                    ("max_results", json!(limit)),
                    ("sort_by_relevance", json!(sort == SortType::Relevance)),
                ]),
            )
        }
    }
}

/// Unwrap the `{content: [{type: "text", text}], isError}` envelope.
///
/// The first text item is parsed as JSON, or returned as a JSON string when
/// it is not JSON. Results without the envelope are returned unchanged.
fn tool_payload(tool: &str, result: Value) -> Result<Value, SourceError> {
    let Some(content) = result.get("content").and_then(Value::as_array) else {
        return Ok(result);
    };

    let text = content
        .iter()
        .find(|item| item.get("type").and_then(Value::as_str) == Some("text"))
        .and_then(|item| item.get("text"))
        .and_then(Value::as_str);

    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        return Err(McpError::Tool {
            tool: tool.to_string(),
            code: 0,
            message: text.unwrap_or("tool reported an error").to_string(),
        }
        .into());
    }

    Ok(match text {
        Some(text) => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        }
        None => Value::Null,
    })
}
