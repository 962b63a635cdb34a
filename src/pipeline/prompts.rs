//! Prompt text for the planner and the summarizer.

use crate::llm::ChatMessage;
use crate::models::{PaperContent, PaperMeta, SummarizationConfig, SummaryDepth};

/// Rough characters-per-token ratio used to cap excerpts
const CHARS_PER_TOKEN: usize = 4;

pub const PLANNER_SYSTEM_PROMPT: &str = r#"You plan literature searches over arXiv.
Turn the user's request into a single JSON search plan. Output only the JSON
object: no explanation, no markdown.

Fields:
- "intent": always "search_papers"
- "source": always "arxiv"
- "filters": object with optional "topic", "author", "date_from" and
  "date_to" (dates as YYYY-MM-DD, both inclusive)
- "sort": "most_recent" or "relevance"
- "limit": number of papers wanted (default 5)
- "summarization": object with "enabled" (boolean), optional "depth"
  ("abstract", "abstract+intro+conclusion" or "full") and optional
  "max_tokens"

Request: five most recent papers on hyper graphs
Plan: {"intent": "search_papers", "source": "arxiv", "filters": {"topic": "hyper graphs"}, "sort": "most_recent", "limit": 5, "summarization": {"enabled": true, "depth": "abstract+intro+conclusion"}}

Request: find papers by Laszlo Lovasz from 2022
Plan: {"intent": "search_papers", "source": "arxiv", "filters": {"author": "Laszlo Lovasz", "date_from": "2022-01-01", "date_to": "2022-12-31"}, "sort": "most_recent", "limit": 5, "summarization": {"enabled": true, "depth": "abstract"}}

Request: the top 3 most relevant papers on diffusion models, no summaries
Plan: {"intent": "search_papers", "source": "arxiv", "filters": {"topic": "diffusion models"}, "sort": "relevance", "limit": 3, "summarization": {"enabled": false}}
"#;

pub const SUMMARY_SYSTEM_PROMPT: &str = r#"You summarize research papers for busy researchers.
Reply with one JSON object and nothing else, using exactly these keys:
- "tldr": list of 2 to 4 short sentences
- "problem": the problem the paper addresses
- "method": the approach taken
- "results": the main findings
- "limitations": stated or evident limitations
- "future_work": open directions
Write "N/A" for anything the text does not cover."#;

/// Planner messages for a natural-language query
pub fn planner_messages(raw_query: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(PLANNER_SYSTEM_PROMPT),
        ChatMessage::user(raw_query),
    ]
}

/// Summarizer messages for one paper
pub fn summary_messages(
    meta: &PaperMeta,
    content: &PaperContent,
    settings: &SummarizationConfig,
) -> Vec<ChatMessage> {
    let selected = select_excerpt(meta, content, settings.depth);
    let excerpt = match settings.max_tokens {
        Some(tokens) => truncate_to_tokens(&selected, tokens),
        None => selected.as_str(),
    };

    let mut user = format!("Title: {}\n", meta.title);
    if !meta.authors.is_empty() {
        user.push_str(&format!("Authors: {}\n", meta.author_line()));
    }
    if !meta.published.is_empty() {
        user.push_str(&format!("Published: {}\n", meta.published));
    }
    user.push('\n');
    user.push_str(excerpt);

    vec![ChatMessage::system(SUMMARY_SYSTEM_PROMPT), ChatMessage::user(user)]
}

/// Text handed to the summarizer for the requested depth
pub fn select_excerpt(meta: &PaperMeta, content: &PaperContent, depth: SummaryDepth) -> String {
    let abstract_text = match meta.abstract_text() {
        "" => content.section("abstract").unwrap_or(""),
        text => text,
    };

    match depth {
        SummaryDepth::Full => content.full_text.clone(),
        SummaryDepth::Abstract if !abstract_text.is_empty() => {
            format!("Abstract:\n{}", abstract_text)
        }
        SummaryDepth::Abstract => content.full_text.clone(),
        SummaryDepth::AbstractIntroConclusion => {
            let intro = find_section(content, "introduction");
            let conclusion = find_section(content, "conclu");
            if intro.is_none() && conclusion.is_none() {
                return content.full_text.clone();
            }

            let parts = [
                ("Abstract", Some(abstract_text).filter(|t| !t.is_empty())),
                ("Introduction", intro),
                ("Conclusion", conclusion),
            ];
            parts
                .iter()
                .filter_map(|(label, text)| text.map(|t| format!("{}:\n{}", label, t)))
                .collect::<Vec<_>>()
                .join("\n\n")
        }
    }
}

/// First section whose name starts with `prefix`
fn find_section<'a>(content: &'a PaperContent, prefix: &str) -> Option<&'a str> {
    content
        .sections
        .iter()
        .find(|(name, _)| name.starts_with(prefix))
        .map(|(_, body)| body.as_str())
}

/// Cut `text` to roughly `max_tokens` tokens on a char boundary
pub fn truncate_to_tokens(text: &str, max_tokens: u32) -> &str {
    let budget = (max_tokens as usize).saturating_mul(CHARS_PER_TOKEN);
    match text.char_indices().nth(budget) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
