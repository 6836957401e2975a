//! Deep search: walk a long time range window by window and merge the pages.
//!
//! The catalog caps every response at [`PAGE_CAP`] items, so a single query
//! over a busy range silently truncates. [`DeepSearch`] asks the
//! [`ChunkPlanner`] how to cut the range, fetches each window through the
//! [`PageFetcher`], follows continuation links while pages come back full,
//! and returns everything it got together with the windows that failed.

use futures::stream::{self, StreamExt};

use crate::fetcher::{CatalogSource, FetchFailure, PageFetcher};
use crate::planner::{ChunkFeedback, ChunkPlanner, ChunkState, DispatchPlan};
use crate::progress::{describe_chunk, ProgressEventKind, ProgressReporter, ProgressSender};
use crate::types::{CatalogItem, SearchCriteria, TimeWindow, PAGE_CAP};

/// A window whose first request failed after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowFailure {
    pub window: TimeWindow,
    pub cause: FetchFailure,
}

/// A window that completed with reduced confidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowWarning {
    /// A continuation page failed; items fetched before it are kept.
    PartialContinuation {
        window: TimeWindow,
        cause: FetchFailure,
    },
    /// The window still filled a whole page that could not be continued.
    PossibleUndercount { window: TimeWindow },
}

/// How the range was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Single,
    Sequential,
    Parallel,
}

/// Merged result of a deep search.
#[derive(Debug, Clone, Default)]
pub struct DeepSearchOutcome {
    pub items: Vec<CatalogItem>,
    pub failures: Vec<WindowFailure>,
    pub warnings: Vec<WindowWarning>,
    pub windows_processed: usize,
    pub mode: SearchMode,
}

impl DeepSearchOutcome {
    pub fn total_items(&self) -> usize {
        self.items.len()
    }

    /// No window failed and no continuation was cut short.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
            && !self
                .warnings
                .iter()
                .any(|w| matches!(w, WindowWarning::PartialContinuation { .. }))
    }
}

/// Everything fetched for one window.
struct WindowFetch {
    window: TimeWindow,
    items: Vec<CatalogItem>,
    /// Size of the window's first page, `None` if it failed.
    first_page: Option<usize>,
    failure: Option<FetchFailure>,
    continuation_failure: Option<FetchFailure>,
    /// Last page was full and offered no way to continue.
    truncated: bool,
}

/// Drives the planner and fetcher across a whole time range.
pub struct DeepSearch<S> {
    fetcher: PageFetcher<S>,
    planner: ChunkPlanner,
    progress: Option<ProgressSender>,
}

impl<S: CatalogSource> DeepSearch<S> {
    pub fn new(fetcher: PageFetcher<S>, planner: ChunkPlanner) -> Self {
        Self {
            fetcher,
            planner,
            progress: None,
        }
    }

    /// Report per-window progress on this channel.
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn fetcher(&self) -> &PageFetcher<S> {
        &self.fetcher
    }

    pub fn planner(&self) -> &ChunkPlanner {
        &self.planner
    }

    /// Search `range` exhaustively. Window failures are collected, never fatal.
    pub async fn run(&self, criteria: &SearchCriteria, range: TimeWindow) -> DeepSearchOutcome {
        let reporter = ProgressReporter::new(self.progress.clone());
        let page_cap = criteria.page_size.clamp(1, PAGE_CAP);

        tracing::info!(
            "Deep search on {} from {range} ({} hours)",
            criteria.host,
            range.span().num_hours()
        );

        let outcome = match self.planner.plan(range) {
            DispatchPlan::Single(window) => {
                let mut outcome = DeepSearchOutcome {
                    mode: SearchMode::Single,
                    ..Default::default()
                };
                let fetched = self.fetch_window(criteria, window, page_cap, &reporter).await;
                record(&mut outcome, fetched, &reporter);
                outcome
            }
            DispatchPlan::Sequential(state) => {
                self.run_sequential(criteria, state, page_cap, &reporter)
                    .await
            }
            DispatchPlan::Parallel {
                windows,
                max_workers,
            } => {
                self.run_parallel(criteria, windows, max_workers, page_cap, &reporter)
                    .await
            }
        };

        reporter.emit(ProgressEventKind::SearchComplete {
            windows: outcome.windows_processed,
            items: outcome.total_items(),
            failures: outcome.failures.len(),
        });
        tracing::debug!(
            "Completed {} windows, total items: {} ({} failed)",
            outcome.windows_processed,
            outcome.total_items(),
            outcome.failures.len()
        );

        outcome
    }

    /// Windows are generated one at a time so each can react to the last.
    async fn run_sequential(
        &self,
        criteria: &SearchCriteria,
        mut state: ChunkState,
        page_cap: usize,
        reporter: &ProgressReporter,
    ) -> DeepSearchOutcome {
        let mut outcome = DeepSearchOutcome {
            mode: SearchMode::Sequential,
            ..Default::default()
        };

        while let Some(window) = state.next_window() {
            let mut fetched = self.fetch_window(criteria, window, page_cap, reporter).await;

            // Sequential windows only report undercount once the chunk
            // can no longer shrink.
            fetched.truncated = false;
            if let Some(first_page) = fetched.first_page {
                match state.observe(first_page, page_cap) {
                    ChunkFeedback::Steady => {}
                    ChunkFeedback::Shrunk { from, to } => {
                        tracing::debug!(
                            "Hit limit, reducing chunk size to {}",
                            describe_chunk(to.num_seconds())
                        );
                        reporter.emit(ProgressEventKind::ChunkShrunk {
                            from_secs: from.num_seconds(),
                            to_secs: to.num_seconds(),
                        });
                    }
                    ChunkFeedback::Saturated => {
                        fetched.truncated = true;
                    }
                }
            }

            record(&mut outcome, fetched, reporter);
        }

        outcome
    }

    /// At most `max_workers` windows are in flight; results are merged by
    /// this task alone as they complete.
    async fn run_parallel(
        &self,
        criteria: &SearchCriteria,
        windows: Vec<TimeWindow>,
        max_workers: usize,
        page_cap: usize,
        reporter: &ProgressReporter,
    ) -> DeepSearchOutcome {
        let mut outcome = DeepSearchOutcome {
            mode: SearchMode::Parallel,
            ..Default::default()
        };

        tracing::debug!(
            "Processing {} windows in parallel with {max_workers} workers",
            windows.len()
        );
        reporter.emit(ProgressEventKind::ParallelStarted {
            windows: windows.len(),
            workers: max_workers,
        });

        let results = stream::iter(windows)
            .map(|window| self.fetch_window(criteria, window, page_cap, reporter))
            .buffer_unordered(max_workers.max(1));
        futures::pin_mut!(results);

        while let Some(fetched) = results.next().await {
            record(&mut outcome, fetched, reporter);
        }

        outcome
    }

    /// Fetch one window and follow its continuation links while pages are full.
    async fn fetch_window(
        &self,
        criteria: &SearchCriteria,
        window: TimeWindow,
        page_cap: usize,
        reporter: &ProgressReporter,
    ) -> WindowFetch {
        reporter.emit(ProgressEventKind::WindowStarted { window });

        let first = match self.fetcher.fetch(criteria, &window, page_cap).await {
            Ok(page) => page,
            Err(cause) => {
                return WindowFetch {
                    window,
                    items: Vec::new(),
                    first_page: None,
                    failure: Some(cause),
                    continuation_failure: None,
                    truncated: false,
                }
            }
        };

        let first_page = first.len();
        let mut last_full = first.is_full(page_cap);
        let mut next = first.next;
        let mut items = first.items;
        let mut continuation_failure = None;

        while last_full {
            let Some(token) = next.take() else {
                break;
            };
            match self.fetcher.follow(&token).await {
                Ok(page) => {
                    last_full = page.is_full(page_cap);
                    next = page.next;
                    let added = page.items.len();
                    items.extend(page.items);
                    tracing::debug!("Fetched additional page for {window}: +{added} items");
                    reporter.emit(ProgressEventKind::ContinuationPage {
                        window,
                        items: added,
                        total: items.len(),
                    });
                }
                Err(cause) => {
                    tracing::warn!("Failed to fetch next page for {window}: {cause}");
                    continuation_failure = Some(cause);
                    break;
                }
            }
        }

        WindowFetch {
            window,
            items,
            first_page: Some(first_page),
            failure: None,
            truncated: last_full && next.is_none() && continuation_failure.is_none(),
            continuation_failure,
        }
    }
}

/// Merge one window's result into the outcome.
fn record(outcome: &mut DeepSearchOutcome, fetched: WindowFetch, reporter: &ProgressReporter) {
    let window = fetched.window;
    outcome.windows_processed += 1;

    if let Some(cause) = fetched.failure {
        tracing::debug!("Window {window} failed: {cause}");
        reporter.emit(ProgressEventKind::WindowFailed {
            window,
            cause: cause.to_string(),
        });
        outcome.failures.push(WindowFailure { window, cause });
        return;
    }

    let count = fetched.items.len();
    outcome.items.extend(fetched.items);
    tracing::debug!(
        "Searched {window}: {count} items (total: {})",
        outcome.items.len()
    );
    reporter.emit(ProgressEventKind::WindowCompleted {
        window,
        items: count,
        total: outcome.items.len(),
    });

    if let Some(cause) = fetched.continuation_failure {
        outcome
            .warnings
            .push(WindowWarning::PartialContinuation { window, cause });
    }

    if fetched.truncated {
        tracing::debug!("Window {window} still hits the page limit; items may be missing");
        reporter.emit(ProgressEventKind::Saturated { window });
        outcome
            .warnings
            .push(WindowWarning::PossibleUndercount { window });
    }
}
