//! Time-window planning for deep catalog searches.
//!
//! Short ranges go out as one window. Medium ranges are walked sequentially
//! by a [`ChunkState`] that halves its chunk width whenever a window comes
//! back full. Very long ranges are cut into fixed one-day windows up front
//! and dispatched in parallel.

use chrono::{DateTime, Duration, Utc};

use crate::types::TimeWindow;

/// Default worker count for parallel dispatch.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Ranges up to this long are searched as a single window.
pub fn single_window_limit() -> Duration {
    Duration::hours(24)
}

/// Smallest chunk the sequential planner shrinks to unless configured otherwise.
pub fn default_min_chunk() -> Duration {
    Duration::hours(1)
}

/// Ranges longer than this are dispatched in parallel (4 × one week).
pub fn parallel_threshold() -> Duration {
    Duration::hours(168 * 4)
}

/// Window width used in parallel mode.
pub fn parallel_window() -> Duration {
    Duration::hours(24)
}

/// Initial sequential chunk width for a range of `span`.
pub fn initial_chunk(span: Duration) -> Duration {
    if span <= Duration::hours(168) {
        Duration::hours(24)
    } else if span <= Duration::hours(720) {
        Duration::hours(72)
    } else {
        Duration::hours(168)
    }
}

/// How a deep search should walk its range.
#[derive(Debug, Clone)]
pub enum DispatchPlan {
    /// One request covers the whole range.
    Single(TimeWindow),
    /// Windows are produced one at a time, adapting to page saturation.
    Sequential(ChunkState),
    /// Fixed windows fetched concurrently.
    Parallel {
        windows: Vec<TimeWindow>,
        max_workers: usize,
    },
}

/// Chooses a dispatch plan for a requested range.
#[derive(Debug, Clone)]
pub struct ChunkPlanner {
    min_chunk: Duration,
    max_workers: usize,
    parallel_after: Duration,
}

impl Default for ChunkPlanner {
    fn default() -> Self {
        Self::new(default_min_chunk(), DEFAULT_MAX_WORKERS)
    }
}

impl ChunkPlanner {
    /// `min_chunk` is floored at one second and `max_workers` at one.
    pub fn new(min_chunk: Duration, max_workers: usize) -> Self {
        Self {
            min_chunk: min_chunk.max(Duration::seconds(1)),
            max_workers: max_workers.max(1),
            parallel_after: parallel_threshold(),
        }
    }

    /// Go parallel only for ranges longer than `span`.
    pub fn with_parallel_after(mut self, span: Duration) -> Self {
        self.parallel_after = span.max(single_window_limit());
        self
    }

    pub fn min_chunk(&self) -> Duration {
        self.min_chunk
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn plan(&self, range: TimeWindow) -> DispatchPlan {
        let span = range.span();

        if span <= single_window_limit() {
            return DispatchPlan::Single(range);
        }

        if span > self.parallel_after {
            return DispatchPlan::Parallel {
                windows: tile_windows(range, parallel_window()),
                max_workers: self.max_workers,
            };
        }

        DispatchPlan::Sequential(ChunkState::new(
            range,
            initial_chunk(span),
            self.min_chunk,
        ))
    }
}

/// Cut `range` into consecutive windows of `width`; the last one may be shorter.
pub fn tile_windows(range: TimeWindow, width: Duration) -> Vec<TimeWindow> {
    let width = width.max(Duration::seconds(1));
    let mut windows = Vec::new();
    let mut cursor = range.start();

    while cursor < range.end() {
        let next = (cursor + width).min(range.end());
        if let Ok(window) = TimeWindow::new(cursor, next) {
            windows.push(window);
        }
        cursor = next;
    }

    windows
}

/// What the planner did with the result of the last window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkFeedback {
    /// Window was not full; chunk width unchanged.
    Steady,
    /// Window was full; following windows are narrower.
    Shrunk { from: Duration, to: Duration },
    /// Window was full at the minimum width. Items may be missing.
    Saturated,
}

/// Sequential window generator with adaptive chunk width.
#[derive(Debug, Clone)]
pub struct ChunkState {
    cursor: DateTime<Utc>,
    end: DateTime<Utc>,
    chunk: Duration,
    min_chunk: Duration,
}

impl ChunkState {
    pub fn new(range: TimeWindow, chunk: Duration, min_chunk: Duration) -> Self {
        Self {
            cursor: range.start(),
            end: range.end(),
            chunk: chunk.max(Duration::seconds(1)),
            min_chunk,
        }
    }

    /// Width the next window will have (before clipping to the range end).
    pub fn chunk(&self) -> Duration {
        self.chunk
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.end
    }

    /// Emit the next window and advance past it.
    pub fn next_window(&mut self) -> Option<TimeWindow> {
        if self.is_finished() {
            return None;
        }
        let next = (self.cursor + self.chunk).min(self.end);
        let window = TimeWindow::new(self.cursor, next).ok()?;
        self.cursor = next;
        Some(window)
    }

    /// Feed back how many items the last window returned.
    pub fn observe(&mut self, returned: usize, page_cap: usize) -> ChunkFeedback {
        if returned < page_cap {
            return ChunkFeedback::Steady;
        }

        if self.chunk > self.min_chunk {
            let from = self.chunk;
            self.chunk = (self.chunk / 2).max(self.min_chunk);
            ChunkFeedback::Shrunk {
                from,
                to: self.chunk,
            }
        } else {
            ChunkFeedback::Saturated
        }
    }
}
