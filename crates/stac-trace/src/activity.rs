//! Activity summaries over a set of catalog items.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::cluster::{cluster_points, ClusterReport};
use crate::types::{CatalogItem, GeoPoint};

/// Days kept in the daily activity histogram.
pub const DAILY_ACTIVITY_DAYS: usize = 7;

/// Collection breakdown, recent daily counts, and hotspots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityAnalysis {
    pub total_items: usize,
    pub collections: BTreeMap<String, usize>,
    /// Item counts for the last dated days, keyed `YYYY-MM-DD`, ascending.
    pub daily_activity: BTreeMap<String, usize>,
    pub clusters: ClusterReport,
}

/// Summarise `items`. With a non-empty `only` set, items from other
/// collections are skipped; they still count toward the hotspot threshold.
pub fn analyze_activity(
    items: &[CatalogItem],
    only: Option<&BTreeSet<String>>,
) -> ActivityAnalysis {
    let only = only.filter(|set| !set.is_empty());

    let mut collections: BTreeMap<String, usize> = BTreeMap::new();
    let mut daily: BTreeMap<String, usize> = BTreeMap::new();
    let mut points: Vec<GeoPoint> = Vec::with_capacity(items.len());

    for item in items {
        if only.is_some_and(|set| !set.contains(&item.collection)) {
            continue;
        }

        *collections.entry(item.collection.clone()).or_insert(0) += 1;

        if let Some(dt) = item.datetime {
            *daily.entry(dt.format("%Y-%m-%d").to_string()).or_insert(0) += 1;
        }

        if let Some(point) = item.location() {
            points.push(point);
        }
    }

    let skip = daily.len().saturating_sub(DAILY_ACTIVITY_DAYS);
    let daily_activity = daily.into_iter().skip(skip).collect();

    ActivityAnalysis {
        total_items: items.len(),
        collections,
        daily_activity,
        clusters: cluster_points(&points, items.len()),
    }
}

/// One acquisition in a location's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// `HH:MM`, UTC.
    pub time: String,
    pub collection: String,
    pub cloud_cover: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineDay {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub events: Vec<TimelineEvent>,
}

/// Group dated items by day, most recent day first. Events keep input order
/// within a day; undated items are skipped.
pub fn build_timeline(items: &[CatalogItem]) -> Vec<TimelineDay> {
    let mut days: BTreeMap<String, Vec<TimelineEvent>> = BTreeMap::new();

    for item in items {
        let Some(dt) = item.datetime else {
            continue;
        };
        days.entry(dt.format("%Y-%m-%d").to_string())
            .or_default()
            .push(TimelineEvent {
                time: dt.format("%H:%M").to_string(),
                collection: item.collection.clone(),
                cloud_cover: item.cloud_cover,
            });
    }

    days.into_iter()
        .rev()
        .map(|(date, events)| TimelineDay { date, events })
        .collect()
}

/// Google Earth link centred on a point at ~50 km altitude.
pub fn earth_url(lat: f64, lon: f64) -> String {
    format!("https://earth.google.com/web/@{lat},{lon},0a,50000d,35y,0h,0t,0r")
}
