//! Structured summaries out of free-form model output.
//!
//! Model replies are unreliable: the JSON may sit in a fenced block, be
//! surrounded by prose, or be missing. [`extract_summary`] always returns a
//! [`Summary`], falling back to one that carries only the raw reply.

use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::sync::OnceLock;

use crate::models::{Summary, SummaryRecord};

fn fenced_json() -> Option<&'static Regex> {
    static FENCED_JSON: OnceLock<Option<Regex>> = OnceLock::new();
    FENCED_JSON
        .get_or_init(|| Regex::new(r"(?is)```[ \t]*json\b(.*?)```").ok())
        .as_ref()
}

/// Locate the JSON text in a model reply.
///
/// The inner content of the first fenced block labelled `json` wins.
/// Otherwise the first balanced `{...}` span is used.
pub fn find_json_candidate(text: &str) -> Option<&str> {
    if let Some(captures) = fenced_json().and_then(|re| re.captures(text)) {
        if let Some(inner) = captures.get(1) {
            return Some(inner.as_str().trim());
        }
    }
    first_object_span(text)
}

/// First `{...}` span with balanced braces, ignoring braces inside strings
fn first_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Summary fields the model is asked to produce
#[derive(Debug, Deserialize)]
struct SummaryFields {
    #[serde(deserialize_with = "one_or_many")]
    tldr: Vec<String>,
    problem: String,
    method: String,
    results: String,
    limitations: String,
    future_work: String,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(point) => vec![point],
        OneOrMany::Many(points) => points,
    })
}

/// Parse a summarizer reply. Never fails.
pub fn extract_summary(response: &str) -> Summary {
    let Some(candidate) = find_json_candidate(response) else {
        tracing::debug!("No JSON found in summarizer response");
        return Summary::fallback(response);
    };

    match serde_json::from_str::<SummaryFields>(candidate) {
        Ok(fields) => Summary::Structured(SummaryRecord {
            tldr: fields.tldr,
            problem: fields.problem,
            method: fields.method,
            results: fields.results,
            limitations: fields.limitations,
            future_work: fields.future_work,
            raw_text: response.to_string(),
        }),
        Err(e) => {
            tracing::debug!("Summarizer JSON does not match the summary schema: {}", e);
            Summary::fallback(response)
        }
    }
}
