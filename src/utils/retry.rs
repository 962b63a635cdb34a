//! Retry utilities with exponential backoff for resilient API calls.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Default backoff with `max_attempts` attempts (at least one)
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Backoff delay after the given failed attempt (1-based)
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powf(attempt.saturating_sub(1) as f64);
        Duration::from_secs_f64(exp.min(self.max_delay.as_secs_f64()))
    }
}

/// Transient errors that should trigger a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientError {
    /// Network connectivity issues
    Network,
    /// Request timeout
    Timeout,
    /// Rate limit exceeded (with optional retry-after seconds)
    RateLimit(Option<u64>),
    /// Server error (5xx)
    ServerError,
}

impl TransientError {
    /// Check if a reqwest error represents a transient error
    pub fn from_reqwest_error(err: &reqwest::Error) -> Option<Self> {
        if err.is_timeout() {
            return Some(TransientError::Timeout);
        }
        if err.is_connect() {
            return Some(TransientError::Network);
        }
        err.status()
            .and_then(|status| Self::from_status(status.as_u16(), None))
    }

    /// Classify an HTTP status code
    pub fn from_status(status: u16, retry_after: Option<u64>) -> Option<Self> {
        match status {
            429 => Some(TransientError::RateLimit(retry_after)),
            500..=599 => Some(TransientError::ServerError),
            _ => None,
        }
    }

    /// Delay asked for by the server, if any
    pub fn recommended_delay(&self) -> Option<Duration> {
        match self {
            TransientError::RateLimit(Some(seconds)) => Some(Duration::from_secs(*seconds)),
            _ => None,
        }
    }
}

/// Errors that know whether they are worth retrying
pub trait Retryable {
    fn transient(&self) -> Option<TransientError>;
}

/// Execute an async operation, retrying transient failures with backoff.
///
/// Permanent errors are returned immediately. After `max_attempts` the last
/// transient error is returned.
pub async fn with_retry<T, E, F, Fut>(config: RetryConfig, mut operation: F) -> Result<T, E>
where
    E: Retryable + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 0;

    loop {
        attempts += 1;

        let error = match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    tracing::info!(
                        "Operation succeeded on attempt {} after {} transient failures",
                        attempts,
                        attempts - 1
                    );
                }
                return Ok(result);
            }
            Err(error) => error,
        };

        let Some(transient) = error.transient() else {
            return Err(error);
        };

        if attempts >= config.max_attempts {
            tracing::warn!("Operation failed after {} attempts: {}", attempts, error);
            return Err(error);
        }

        let backoff = config.backoff(attempts);
        let delay = transient
            .recommended_delay()
            .map_or(backoff, |asked| asked.max(backoff))
            .min(config.max_delay);

        tracing::debug!(
            "Transient error on attempt {}: {:?}, retrying in {:?}",
            attempts,
            transient,
            delay
        );
        sleep(delay).await;
    }
}
