//! Command handlers. Each one talks to the catalog and returns a report;
//! rendering lives in [`crate::output`].

use anyhow::{ensure, Context};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use stac_trace::activity::{analyze_activity, build_timeline, earth_url, ActivityAnalysis, TimelineDay};
use stac_trace::catalog::StacClient;
use stac_trace::fetcher::PageFetcher;
use stac_trace::geocode::ReverseGeocoder;
use stac_trace::infrastructure::{InfrastructureLookup, InfrastructureReport};
use stac_trace::planner::ChunkPlanner;
use stac_trace::progress::{describe_chunk, ProgressEventKind, ProgressReceiver, ProgressSender};
use stac_trace::search::{DeepSearch, SearchMode, WindowWarning};
use stac_trace::types::{
    BoundingBox, CatalogItem, Collection, GeoPoint, SearchCriteria, TimeWindow, PAGE_CAP,
};

/// Hotspots shown in detail.
pub const TOP_HOTSPOTS: usize = 10;

/// Infrastructure search radius around each hotspot.
pub const HOTSPOT_INFRA_RADIUS_KM: f64 = 5.0;

/// Page size for a location watch.
pub const WATCH_LIMIT: usize = 100;

/// Sort key for collections without a numeric resolution.
const UNKNOWN_RESOLUTION: f64 = 999.0;

// ─────────────────────── collections ───────────────────────

/// Catalog collections, finest resolution first. Without `all`, only
/// taskable high-resolution collections are kept.
pub async fn collections(client: &StacClient, all: bool) -> anyhow::Result<Vec<Collection>> {
    let listed = client.list_collections().await?;
    let mut selected = if all {
        listed
    } else {
        stac_trace::catalog::taskable_collections(
            &listed,
            stac_trace::catalog::TASKABLE_MAX_RESOLUTION,
        )
    };
    sort_by_resolution(&mut selected);
    Ok(selected)
}

pub fn sort_by_resolution(collections: &mut [Collection]) {
    let key = |c: &Collection| c.min_resolution().unwrap_or(UNKNOWN_RESOLUTION);
    collections.sort_by(|a, b| key(a).total_cmp(&key(b)));
}

// ─────────────────────── search ───────────────────────

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub host: String,
    pub bbox: Option<BoundingBox>,
    pub days: u32,
    pub collection: Option<String>,
    pub cloud: Option<u8>,
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct SearchResults {
    pub range: TimeWindow,
    pub items: Vec<CatalogItem>,
    /// The page was full and the catalog offered more.
    pub more_available: bool,
}

/// One page of recent imagery.
pub async fn search(
    client: &StacClient,
    options: &SearchOptions,
    now: DateTime<Utc>,
) -> anyhow::Result<SearchResults> {
    let range = TimeWindow::last_days(options.days, now)?;
    let limit = options.limit.clamp(1, PAGE_CAP);
    let criteria = SearchCriteria::new(&options.host)
        .with_bbox(options.bbox)
        .with_collections(options.collection.iter().cloned().collect())
        .with_max_cloud_cover(options.cloud)
        .with_page_size(limit);

    tracing::info!(
        "Searching {} for imagery from {} to {}",
        options.host,
        range.start().date_naive(),
        range.end().date_naive()
    );

    let page = PageFetcher::new(client.clone())
        .fetch(&criteria, &range, limit)
        .await
        .with_context(|| format!("Search on {} failed", options.host))?;

    let more_available = page.is_full(limit) && page.next.is_some();
    if more_available {
        tracing::warn!("Showing the first {limit} items; more results are available");
    }

    Ok(SearchResults {
        range,
        items: page.items,
        more_available,
    })
}

// ─────────────────────── hotspots ───────────────────────

#[derive(Debug, Clone)]
pub struct HotspotOptions {
    pub host: String,
    pub days: u32,
    pub bbox: Option<BoundingBox>,
    pub infra: bool,
    pub min_chunk_hours: u32,
    pub workers: usize,
}

/// Place-name and infrastructure collaborators for hotspot enrichment.
pub struct Lookups<'a> {
    pub geocoder: &'a dyn ReverseGeocoder,
    /// `None` skips the infrastructure query.
    pub infrastructure: Option<&'a dyn InfrastructureLookup>,
}

/// Infrastructure outcome for one hotspot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum InfrastructureStatus {
    Found { categories: InfrastructureReport },
    Empty,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct HotspotEntry {
    pub rank: usize,
    pub lat: i32,
    pub lon: i32,
    pub count: usize,
    pub place: String,
    pub earth_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infrastructure: Option<InfrastructureStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HotspotSummary {
    pub host: String,
    pub range: TimeWindow,
    pub taskable_collections: Vec<String>,
    pub mode: String,
    pub windows_processed: usize,
    /// Windows that returned nothing because their first request failed.
    pub failed_windows: Vec<String>,
    pub warnings: Vec<String>,
    pub analysis: ActivityAnalysis,
    pub hotspots: Vec<HotspotEntry>,
}

/// Deep-search taskable collections, cluster the results, and enrich the
/// top hotspots with place names and optional infrastructure.
pub async fn hotspots(
    client: &StacClient,
    options: &HotspotOptions,
    now: DateTime<Utc>,
    lookups: Lookups<'_>,
    progress: Option<ProgressSender>,
) -> anyhow::Result<HotspotSummary> {
    ensure!(options.min_chunk_hours > 0, "--min-chunk-hours must be at least 1");
    ensure!(options.workers > 0, "--workers must be at least 1");

    let range = TimeWindow::last_days(options.days, now)?;
    tracing::info!(
        "Analyzing {} activity from {} to {}",
        options.host,
        range.start().date_naive(),
        range.end().date_naive()
    );

    let taskable = client.taskable_collection_names().await?;
    let preview = taskable.iter().take(5).cloned().collect::<Vec<_>>().join(", ");
    let ellipsis = if taskable.len() > 5 { "..." } else { "" };
    tracing::info!(
        "Found {} taskable collections: {preview}{ellipsis}",
        taskable.len()
    );

    let criteria = SearchCriteria::new(&options.host)
        .with_bbox(options.bbox)
        .with_collections(taskable.clone());
    let planner = ChunkPlanner::new(
        Duration::hours(i64::from(options.min_chunk_hours)),
        options.workers,
    );

    let mut deep = DeepSearch::new(PageFetcher::new(client.clone()), planner);
    if let Some(tx) = progress {
        deep = deep.with_progress(tx);
    }
    let outcome = deep.run(&criteria, range).await;

    let analysis = analyze_activity(&outcome.items, None);

    let mut entries = Vec::new();
    for (index, hotspot) in analysis.clusters.hotspots.iter().take(TOP_HOTSPOTS).enumerate() {
        let (lat, lon) = (f64::from(hotspot.lat), f64::from(hotspot.lon));
        let point = GeoPoint::new(lat, lon);
        let place = lookups.geocoder.place_name(point).await;

        let infrastructure = match lookups.infrastructure {
            Some(lookup) => Some(match lookup.lookup(point, HOTSPOT_INFRA_RADIUS_KM).await {
                Ok(report) if report.is_empty() => InfrastructureStatus::Empty,
                Ok(report) => InfrastructureStatus::Found { categories: report },
                Err(e) => {
                    tracing::warn!("Infrastructure query for ({lat}, {lon}) failed: {e}");
                    InfrastructureStatus::Failed {
                        reason: e.to_string(),
                    }
                }
            }),
            None => None,
        };

        entries.push(HotspotEntry {
            rank: index + 1,
            lat: hotspot.lat,
            lon: hotspot.lon,
            count: hotspot.count,
            place,
            earth_url: earth_url(lat, lon),
            infrastructure,
        });
    }

    let failed_windows = outcome
        .failures
        .iter()
        .map(|f| format!("{}: {}", f.window, f.cause))
        .collect();
    let warnings = outcome.warnings.iter().map(describe_warning).collect();

    Ok(HotspotSummary {
        host: options.host.clone(),
        range,
        taskable_collections: taskable,
        mode: mode_name(outcome.mode).to_string(),
        windows_processed: outcome.windows_processed,
        failed_windows,
        warnings,
        analysis,
        hotspots: entries,
    })
}

fn mode_name(mode: SearchMode) -> &'static str {
    match mode {
        SearchMode::Single => "single",
        SearchMode::Sequential => "sequential",
        SearchMode::Parallel => "parallel",
    }
}

fn describe_warning(warning: &WindowWarning) -> String {
    match warning {
        WindowWarning::PartialContinuation { window, cause } => {
            format!("{window}: continuation failed ({cause}), results may be partial")
        }
        WindowWarning::PossibleUndercount { window } => {
            format!("{window}: page limit still reached at minimum chunk size, may be missing items")
        }
    }
}

/// Log progress events until every sender is gone.
pub fn log_progress(mut rx: ProgressReceiver) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event.event,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Progress log skipped {skipped} events");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };

            match event {
                ProgressEventKind::ParallelStarted { windows, workers } => {
                    tracing::info!("Processing {windows} windows in parallel with {workers} workers")
                }
                ProgressEventKind::WindowStarted { window } => {
                    tracing::debug!("Searching {window}")
                }
                ProgressEventKind::ContinuationPage { window, items, total } => {
                    tracing::info!("{window}: +{items} items from next page (total: {total})")
                }
                ProgressEventKind::WindowCompleted { window, items, total } => {
                    tracing::info!("{window}: {items} items (total: {total})")
                }
                ProgressEventKind::WindowFailed { window, cause } => {
                    tracing::warn!("{window}: {cause}")
                }
                ProgressEventKind::ChunkShrunk { to_secs, .. } => {
                    tracing::info!("Hit limit, reducing chunk size to {}", describe_chunk(to_secs))
                }
                ProgressEventKind::Saturated { window } => {
                    tracing::warn!("{window}: still hitting the page limit at minimum chunk size")
                }
                ProgressEventKind::SearchComplete {
                    windows,
                    items,
                    failures,
                } => tracing::info!(
                    "Completed {windows} windows, total items: {items}, failed windows: {failures}"
                ),
            }
        }
    })
}

// ─────────────────────── watch ───────────────────────

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub lat: f64,
    pub lon: f64,
    pub host: String,
    /// Half-width of the search box, in degrees.
    pub radius: f64,
    pub days: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatchReport {
    pub place: String,
    pub lat: f64,
    pub lon: f64,
    pub radius: f64,
    pub host: String,
    pub range: TimeWindow,
    pub total_items: usize,
    pub timeline: Vec<TimelineDay>,
}

/// Recent acquisitions over one location, grouped by day.
pub async fn watch(
    client: &StacClient,
    options: &WatchOptions,
    now: DateTime<Utc>,
    geocoder: &dyn ReverseGeocoder,
) -> anyhow::Result<WatchReport> {
    ensure!(
        (-90.0..=90.0).contains(&options.lat) && (-180.0..=180.0).contains(&options.lon),
        "coordinates out of range: ({}, {})",
        options.lat,
        options.lon
    );
    ensure!(options.radius > 0.0, "--radius must be positive");

    let point = GeoPoint::new(options.lat, options.lon);
    let range = TimeWindow::last_days(options.days, now)?;
    let place = geocoder.place_name(point).await;

    tracing::info!(
        "Checking {} imagery for {place} ({}, {}) ±{}° from {} to {}",
        options.host,
        options.lat,
        options.lon,
        options.radius,
        range.start().date_naive(),
        range.end().date_naive()
    );

    let criteria = SearchCriteria::new(&options.host)
        .with_bbox(Some(BoundingBox::around(point, options.radius)))
        .with_page_size(WATCH_LIMIT);
    let page = PageFetcher::new(client.clone())
        .fetch(&criteria, &range, WATCH_LIMIT)
        .await
        .with_context(|| format!("Search on {} failed", options.host))?;

    Ok(WatchReport {
        place,
        lat: options.lat,
        lon: options.lon,
        radius: options.radius,
        host: options.host.clone(),
        range,
        total_items: page.len(),
        timeline: build_timeline(&page.items),
    })
}
