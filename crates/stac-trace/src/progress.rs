//! Progress events emitted while a deep search walks its windows.
//!
//! Events flow through a `tokio::sync::broadcast` channel to any number of
//! subscribers (console renderer, tests). When nobody is subscribed the
//! events are dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::types::TimeWindow;

/// A progress event for one deep-search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Monotonically increasing sequence number within the run.
    pub seq: u64,
    pub event: ProgressEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    /// Parallel dispatch is about to start.
    ParallelStarted { windows: usize, workers: usize },
    /// A window request is about to be issued.
    WindowStarted { window: TimeWindow },
    /// An additional page was fetched through a continuation link.
    ContinuationPage {
        window: TimeWindow,
        items: usize,
        total: usize,
    },
    /// A window finished, possibly after following continuation links.
    WindowCompleted {
        window: TimeWindow,
        items: usize,
        total: usize,
    },
    /// A window failed after exhausting retries.
    WindowFailed { window: TimeWindow, cause: String },
    /// The chunk width was halved after a full page.
    ChunkShrunk { from_secs: i64, to_secs: i64 },
    /// A window came back full at the minimum chunk width.
    Saturated { window: TimeWindow },
    /// The run is over.
    SearchComplete {
        windows: usize,
        items: usize,
        failures: usize,
    },
}

pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a progress channel. 1024 events covers a year of daily windows.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(1024)
}

/// Emits events with a run-wide sequence number. Shared by reference
/// between concurrent window fetches.
#[derive(Debug, Default)]
pub struct ProgressReporter {
    tx: Option<ProgressSender>,
    seq: AtomicU64,
}

impl ProgressReporter {
    pub fn new(tx: Option<ProgressSender>) -> Self {
        Self {
            tx,
            seq: AtomicU64::new(0),
        }
    }

    /// Emit an event, ignoring the error returned when no receiver is listening.
    pub fn emit(&self, event: ProgressEventKind) {
        if let Some(ref sender) = self.tx {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
            let _ = sender.send(ProgressEvent { seq, event });
        }
    }

    /// Number of events emitted so far.
    pub fn emitted(&self) -> u64 {
        self.seq.load(Ordering::Relaxed)
    }
}

/// Human-readable chunk width ("3 days", "6 hours", "30 minutes").
pub fn describe_chunk(secs: i64) -> String {
    if secs >= 86_400 && secs % 86_400 == 0 {
        format!("{} days", secs / 86_400)
    } else if secs >= 3_600 {
        format!("{} hours", secs / 3_600)
    } else {
        format!("{} minutes", secs / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_increments_sequence() {
        let (tx, mut rx) = channel();
        let reporter = ProgressReporter::new(Some(tx));
        reporter.emit(ProgressEventKind::ChunkShrunk {
            from_secs: 86_400,
            to_secs: 43_200,
        });
        reporter.emit(ProgressEventKind::SearchComplete {
            windows: 1,
            items: 0,
            failures: 0,
        });
        assert_eq!(rx.try_recv().unwrap().seq, 1);
        assert_eq!(rx.try_recv().unwrap().seq, 2);
    }

    #[test]
    fn test_emit_without_receivers() {
        let (tx, rx) = channel();
        drop(rx);
        let reporter = ProgressReporter::new(Some(tx));
        reporter.emit(ProgressEventKind::ParallelStarted {
            windows: 3,
            workers: 2,
        });
        assert_eq!(reporter.emitted(), 1);
    }

    #[test]
    fn test_emit_none_sender() {
        let reporter = ProgressReporter::default();
        reporter.emit(ProgressEventKind::ParallelStarted {
            windows: 3,
            workers: 2,
        });
        assert_eq!(reporter.emitted(), 0);
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = ProgressEvent {
            seq: 4,
            event: ProgressEventKind::ChunkShrunk {
                from_secs: 7_200,
                to_secs: 3_600,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"ChunkShrunk\""));
    }

    #[test]
    fn test_describe_chunk() {
        assert_eq!(describe_chunk(3 * 86_400), "3 days");
        assert_eq!(describe_chunk(12 * 3_600), "12 hours");
        assert_eq!(describe_chunk(1_800), "30 minutes");
    }
}
