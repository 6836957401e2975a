//! Grid-based spatial clustering of imagery locations into hotspots.
//!
//! Locations are bucketed into 1° cells (truncated toward zero). Cells are
//! visited in order of (count desc, key asc); each unvisited seed absorbs any
//! unvisited 8-neighbour holding more than 30% of the seed's own count. The
//! cluster is keyed by the floored mean of its cell coordinates. Clusters
//! below `max(5, min(50, 1% of all items))` are dropped.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::{CatalogItem, GeoPoint, Hotspot};

/// Neighbour absorption ratio, as a fraction `NUM / DEN` of the seed count.
const NEIGHBOR_RATIO_NUM: usize = 3;
const NEIGHBOR_RATIO_DEN: usize = 10;

const MIN_THRESHOLD: f64 = 5.0;
const MAX_THRESHOLD: f64 = 50.0;
const THRESHOLD_FRACTION: f64 = 0.01;

type CellKey = (i32, i32);

/// Result of one clustering run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterReport {
    /// Significant clusters, ordered by count desc then key asc.
    pub hotspots: Vec<Hotspot>,
    /// Minimum cluster size that qualified.
    pub threshold: f64,
    /// Items handed to the clusterer, located or not.
    pub total_items: usize,
    /// Items that resolved to a location.
    pub located_items: usize,
    /// Clusters formed before the significance filter.
    pub candidates: usize,
}

/// Grid cell for a point: latitude and longitude truncated to whole degrees.
pub fn grid_cell(point: GeoPoint) -> (i32, i32) {
    (point.lat.trunc() as i32, point.lon.trunc() as i32)
}

/// `max(5, min(50, 1% of total))`.
pub fn significance_threshold(total_items: usize) -> f64 {
    (total_items as f64 * THRESHOLD_FRACTION)
        .min(MAX_THRESHOLD)
        .max(MIN_THRESHOLD)
}

/// Cluster catalog items; items without a resolvable location are skipped
/// but still count toward the threshold.
pub fn cluster(items: &[CatalogItem]) -> ClusterReport {
    let points: Vec<GeoPoint> = items.iter().filter_map(CatalogItem::location).collect();
    cluster_points(&points, items.len())
}

/// Cluster raw points. `total_items` drives the significance threshold.
/// Points outside valid coordinate ranges are skipped.
pub fn cluster_points(points: &[GeoPoint], total_items: usize) -> ClusterReport {
    let mut cells: BTreeMap<CellKey, usize> = BTreeMap::new();
    let mut located = 0;
    for point in points.iter().filter(|p| p.is_valid()) {
        *cells.entry(grid_cell(*point)).or_insert(0) += 1;
        located += 1;
    }

    let merged = merge_cells(&cells);
    let candidates = merged.len();
    let threshold = significance_threshold(total_items);

    let mut hotspots: Vec<Hotspot> = merged
        .into_iter()
        .filter(|(_, count)| *count as f64 >= threshold)
        .map(|((lat, lon), count)| Hotspot { lat, lon, count })
        .collect();
    hotspots.sort_by_key(|h| (Reverse(h.count), h.key()));

    tracing::debug!(
        "Clustered {located} located items into {candidates} clusters, {} above threshold {threshold}",
        hotspots.len()
    );

    ClusterReport {
        hotspots,
        threshold,
        total_items,
        located_items: located,
        candidates,
    }
}

/// Merge adjacent cells into clusters keyed by their centroid cell.
fn merge_cells(cells: &BTreeMap<CellKey, usize>) -> BTreeMap<CellKey, usize> {
    let mut seeds: Vec<(CellKey, usize)> = cells.iter().map(|(k, c)| (*k, *c)).collect();
    seeds.sort_by_key(|(key, count)| (Reverse(*count), *key));

    let mut processed: HashSet<CellKey> = HashSet::with_capacity(cells.len());
    let mut merged: BTreeMap<CellKey, usize> = BTreeMap::new();

    for (seed, count) in seeds {
        if !processed.insert(seed) {
            continue;
        }

        let mut total = count;
        let mut members = vec![seed];

        for dlat in -1..=1 {
            for dlon in -1..=1 {
                if dlat == 0 && dlon == 0 {
                    continue;
                }
                let (Some(lat), Some(lon)) = (seed.0.checked_add(dlat), seed.1.checked_add(dlon))
                else {
                    continue;
                };
                let neighbor = (lat, lon);
                let Some(&neighbor_count) = cells.get(&neighbor) else {
                    continue;
                };
                if processed.contains(&neighbor) {
                    continue;
                }
                if neighbor_count * NEIGHBOR_RATIO_DEN > count * NEIGHBOR_RATIO_NUM {
                    total += neighbor_count;
                    members.push(neighbor);
                    processed.insert(neighbor);
                }
            }
        }

        let centroid = centroid_of(&members);
        let slot = merged.entry(centroid).or_insert(0);
        *slot = (*slot).max(total);
    }

    merged
}

/// Floored mean of member coordinates.
fn centroid_of(members: &[CellKey]) -> CellKey {
    let n = members.len().max(1) as i64;
    let lat_sum: i64 = members.iter().map(|(lat, _)| i64::from(*lat)).sum();
    let lon_sum: i64 = members.iter().map(|(_, lon)| i64::from(*lon)).sum();
    (lat_sum.div_euclid(n) as i32, lon_sum.div_euclid(n) as i32)
}
