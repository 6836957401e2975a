//! Single-window catalog fetches with retry on transient failures.
//!
//! A [`CatalogSource`] performs exactly one attempt per call. [`PageFetcher`]
//! wraps it with the retry policy: rate limiting backs off exponentially,
//! server and network errors wait a flat delay, timeouts retry immediately.
//! Permanent failures (other 4xx, malformed bodies) are returned at once.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::types::{ContinuationToken, SearchCriteria, SearchPage, TimeWindow, PAGE_CAP};

/// Why a catalog call failed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("rate limited")]
    RateLimited,

    #[error("server error: {0}")]
    Server(u16),

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("client error: {0}")]
    Client(u16),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FetchFailure {
    /// Transient failures are retried; everything else escalates immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchFailure::RateLimited
                | FetchFailure::Server(_)
                | FetchFailure::Timeout
                | FetchFailure::Network(_)
        )
    }

    /// Classify a non-success HTTP status. `None` for 2xx.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            429 => Some(FetchFailure::RateLimited),
            500.. => Some(FetchFailure::Server(status)),
            _ => Some(FetchFailure::Client(status)),
        }
    }
}

impl From<reqwest::Error> for FetchFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchFailure::Timeout
        } else if err.is_decode() {
            FetchFailure::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            FetchFailure::from_status(status.as_u16())
                .unwrap_or_else(|| FetchFailure::Network(err.to_string()))
        } else {
            FetchFailure::Network(err.to_string())
        }
    }
}

/// One attempt against the remote catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Search one time window, returning at most `limit` items.
    async fn search(
        &self,
        criteria: &SearchCriteria,
        window: &TimeWindow,
        limit: usize,
    ) -> Result<SearchPage, FetchFailure>;

    /// Fetch the page a continuation token points at.
    async fn follow(&self, token: &ContinuationToken) -> Result<SearchPage, FetchFailure>;
}

/// Retry limits and delays for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// First rate-limit delay; doubles on each further retry.
    pub rate_limit_base: Duration,
    /// Flat delay after a 5xx response.
    pub server_delay: Duration,
    /// Flat delay after a connection-level error.
    pub network_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            rate_limit_base: Duration::from_secs(1),
            server_delay: Duration::from_secs(1),
            network_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Same retry count, no waiting. Useful for tests and local mirrors.
    pub fn immediate() -> Self {
        Self {
            rate_limit_base: Duration::ZERO,
            server_delay: Duration::ZERO,
            network_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based), or `None` if the failure
    /// is not retryable.
    pub fn delay_for(&self, failure: &FetchFailure, retry: u32) -> Option<Duration> {
        match failure {
            FetchFailure::RateLimited => Some(self.rate_limit_base * 2u32.saturating_pow(retry)),
            FetchFailure::Server(_) => Some(self.server_delay),
            FetchFailure::Network(_) => Some(self.network_delay),
            FetchFailure::Timeout => Some(Duration::ZERO),
            FetchFailure::Client(_) | FetchFailure::Malformed(_) => None,
        }
    }
}

/// Issues bounded catalog requests and retries transient failures.
pub struct PageFetcher<S> {
    source: S,
    policy: RetryPolicy,
}

impl<S: CatalogSource> PageFetcher<S> {
    pub fn new(source: S) -> Self {
        Self::with_policy(source, RetryPolicy::default())
    }

    pub fn with_policy(source: S, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch the first page of `window`. `page_cap` is clamped to the catalog maximum.
    pub async fn fetch(
        &self,
        criteria: &SearchCriteria,
        window: &TimeWindow,
        page_cap: usize,
    ) -> Result<SearchPage, FetchFailure> {
        let limit = page_cap.clamp(1, PAGE_CAP);
        retry_with_policy(&self.policy, "Catalog", || {
            self.source.search(criteria, window, limit)
        })
        .await
    }

    /// Fetch the page behind a continuation token.
    pub async fn follow(&self, token: &ContinuationToken) -> Result<SearchPage, FetchFailure> {
        retry_with_policy(&self.policy, "Catalog", || self.source.follow(token)).await
    }
}

/// Run `attempt` until it succeeds, fails permanently, or exhausts
/// `policy.max_retries`. `what` names the remote in log lines.
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut attempt: F,
) -> Result<T, FetchFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchFailure>>,
{
    let mut retries = 0u32;

    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(failure) => {
                let delay = match policy.delay_for(&failure, retries) {
                    Some(delay) if retries < policy.max_retries => delay,
                    Some(_) => {
                        tracing::warn!(
                            "{what} request failed after {} attempts: {failure}",
                            retries + 1
                        );
                        return Err(failure);
                    }
                    None => {
                        tracing::warn!("{what} request failed permanently: {failure}");
                        return Err(failure);
                    }
                };

                retries += 1;
                tracing::debug!(
                    "Retrying {what} request ({retries}/{}) after {failure}, waiting {:?}",
                    policy.max_retries,
                    delay
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FetchFailure::RateLimited.is_transient());
        assert!(FetchFailure::Server(503).is_transient());
        assert!(FetchFailure::Timeout.is_transient());
        assert!(FetchFailure::Network("reset".into()).is_transient());
        assert!(!FetchFailure::Client(400).is_transient());
        assert!(!FetchFailure::Malformed("eof".into()).is_transient());
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(FetchFailure::from_status(200), None);
        assert_eq!(
            FetchFailure::from_status(429),
            Some(FetchFailure::RateLimited)
        );
        assert_eq!(
            FetchFailure::from_status(503),
            Some(FetchFailure::Server(503))
        );
        assert_eq!(
            FetchFailure::from_status(404),
            Some(FetchFailure::Client(404))
        );
    }

    #[test]
    fn test_rate_limit_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(&FetchFailure::RateLimited, 0),
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            policy.delay_for(&FetchFailure::RateLimited, 1),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_timeout_retries_without_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(&FetchFailure::Timeout, 1),
            Some(Duration::ZERO)
        );
        assert_eq!(
            policy.delay_for(&FetchFailure::Network("x".into()), 1),
            Some(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_permanent_failures_have_no_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(&FetchFailure::Client(404), 0), None);
        assert_eq!(
            policy.delay_for(&FetchFailure::Malformed("bad".into()), 0),
            None
        );
    }
}
