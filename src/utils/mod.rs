//! Utilities shared by the LLM clients.
//!
//! - [`HttpClient`]: shared `reqwest` client with timeouts and a user agent
//! - [`with_retry`]: run an async operation again after transient failures,
//!   with exponential backoff

mod http;
mod retry;

pub use http::HttpClient;
pub use retry::{with_retry, Retryable, RetryConfig, TransientError};
