//! stac-trace: deep STAC catalog search, imaging hotspot clustering, and infrastructure significance scoring.

pub mod activity;
pub mod cache;
pub mod catalog;
pub mod cluster;
pub mod fetcher;
pub mod geocode;
pub mod infrastructure;
pub mod planner;
pub mod progress;
pub mod scoring;
pub mod search;
pub mod types;

pub use activity::{analyze_activity, build_timeline, earth_url, ActivityAnalysis, TimelineDay};
pub use cache::BoundedCache;
pub use catalog::{authenticate, taskable_collections, Credentials, StacClient};
pub use cluster::{cluster, grid_cell, significance_threshold, ClusterReport};
pub use fetcher::{CatalogSource, FetchFailure, PageFetcher, RetryPolicy};
pub use geocode::{NominatimGeocoder, ReverseGeocoder};
pub use infrastructure::{
    rank_elements, Category, InfrastructureEntry, InfrastructureError, InfrastructureLookup,
    InfrastructureReport, OverpassClient, ScoredElement,
};
pub use planner::{ChunkFeedback, ChunkPlanner, ChunkState, DispatchPlan};
pub use progress::{ProgressEvent, ProgressEventKind};
pub use scoring::{significance_score, ElementKind};
pub use search::{DeepSearch, DeepSearchOutcome, SearchMode, WindowFailure, WindowWarning};
pub use types::*;
