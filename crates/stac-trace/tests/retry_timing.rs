//! Backoff timing under tokio's paused clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::time::Instant;

use stac_trace::fetcher::{CatalogSource, FetchFailure, PageFetcher, RetryPolicy};
use stac_trace::types::{ContinuationToken, SearchCriteria, SearchPage, TimeWindow};

/// Fails with the scripted causes, then returns an empty page.
struct Flaky {
    script: Mutex<VecDeque<FetchFailure>>,
    calls: AtomicUsize,
}

impl Flaky {
    fn new(script: Vec<FetchFailure>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    fn next(&self) -> Result<SearchPage, FetchFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(failure) => Err(failure),
            None => Ok(SearchPage::default()),
        }
    }
}

#[async_trait]
impl CatalogSource for Flaky {
    async fn search(
        &self,
        _criteria: &SearchCriteria,
        _window: &TimeWindow,
        _limit: usize,
    ) -> Result<SearchPage, FetchFailure> {
        self.next()
    }

    async fn follow(&self, _token: &ContinuationToken) -> Result<SearchPage, FetchFailure> {
        self.next()
    }
}

fn window() -> TimeWindow {
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    TimeWindow::new(start, start + chrono::Duration::hours(1)).unwrap()
}

async fn timed_fetch(script: Vec<FetchFailure>) -> (Result<SearchPage, FetchFailure>, Duration, usize) {
    let fetcher = PageFetcher::new(Flaky::new(script));
    let started = Instant::now();
    let result = fetcher
        .fetch(&SearchCriteria::new("oneatlas"), &window(), 500)
        .await;
    let calls = fetcher.source().calls.load(Ordering::SeqCst);
    (result, started.elapsed(), calls)
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_backs_off_one_then_two_seconds() {
    let (result, elapsed, calls) =
        timed_fetch(vec![FetchFailure::RateLimited, FetchFailure::RateLimited]).await;
    assert!(result.is_ok());
    assert_eq!(calls, 3);
    assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_server_errors_wait_flat_delay() {
    let (result, elapsed, calls) =
        timed_fetch(vec![FetchFailure::Server(500), FetchFailure::Server(503)]).await;
    assert!(result.is_ok());
    assert_eq!(calls, 3);
    assert!(elapsed >= Duration::from_secs(2), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_retry_immediately() {
    let (result, elapsed, calls) =
        timed_fetch(vec![FetchFailure::Timeout, FetchFailure::Timeout]).await;
    assert!(result.is_ok());
    assert_eq!(calls, 3);
    assert!(elapsed < Duration::from_millis(1), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_returns_without_waiting() {
    let (result, elapsed, calls) = timed_fetch(vec![FetchFailure::Client(403)]).await;
    assert_eq!(result.unwrap_err(), FetchFailure::Client(403));
    assert_eq!(calls, 1);
    assert_eq!(elapsed, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_surface_last_cause() {
    let (result, _, calls) = timed_fetch(vec![
        FetchFailure::RateLimited,
        FetchFailure::RateLimited,
        FetchFailure::RateLimited,
    ])
    .await;
    assert_eq!(result.unwrap_err(), FetchFailure::RateLimited);
    assert_eq!(calls, 3);
}

#[test]
fn test_immediate_policy_keeps_retry_count() {
    let policy = RetryPolicy::immediate();
    assert_eq!(policy.max_retries, 2);
    assert_eq!(
        policy.delay_for(&FetchFailure::RateLimited, 1),
        Some(Duration::ZERO)
    );
}
