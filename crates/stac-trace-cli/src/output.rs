//! Plain-text and JSON rendering for command reports.

use std::fmt::Write as _;

use clap::ValueEnum;
use stac_trace::infrastructure::{Category, InfrastructureEntry};
use stac_trace::scoring::UNNAMED;
use stac_trace::types::{CatalogItem, Collection};

use crate::commands::{HotspotSummary, InfrastructureStatus, WatchReport};

/// Widest bar drawn in the daily activity chart.
const MAX_BAR: usize = 50;

/// Item ids longer than this are shortened in tables.
const MAX_ID_CHARS: usize = 25;

/// Infrastructure categories printed per hotspot.
const MAX_CATEGORIES_SHOWN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Left-aligned text table with a title line.
#[derive(Debug, Default)]
pub struct Table {
    title: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(title: impl Into<String>, headers: &[&str]) -> Self {
        Self {
            title: title.into(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn render(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate().take(widths.len()) {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let line = |cells: &[String]| -> String {
            cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{cell:<width$}"))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let mut out = String::new();
        let _ = writeln!(out, "{}", self.title);
        let _ = writeln!(out, "{}", line(&self.headers));
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        let _ = writeln!(out, "{}", line(&rule));
        for row in &self.rows {
            let _ = writeln!(out, "{}", line(row));
        }
        out
    }
}

// ─────────────────────── items ───────────────────────

fn short_id(id: &str) -> String {
    if id.is_empty() {
        return "N/A".to_string();
    }
    if id.chars().count() > MAX_ID_CHARS {
        let head: String = id.chars().take(MAX_ID_CHARS).collect();
        format!("{head}...")
    } else {
        id.to_string()
    }
}

pub fn render_items(items: &[CatalogItem], format: OutputFormat) -> anyhow::Result<String> {
    if items.is_empty() {
        return Ok("No items found\n".to_string());
    }

    if format == OutputFormat::Json {
        let raw: Vec<_> = items.iter().map(|item| &item.raw).collect();
        return Ok(format!("{}\n", serde_json::to_string_pretty(&raw)?));
    }

    let mut table = Table::new(
        format!("Found {} items", items.len()),
        &["Date", "Satellite", "Location", "Cloud %", "ID"],
    );
    for item in items {
        table.push(vec![
            item.datetime
                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            item.collection.clone(),
            item.location()
                .map(|p| format!("{:.2}, {:.2}", p.lat, p.lon))
                .unwrap_or_else(|| "N/A".to_string()),
            item.cloud_cover
                .map(|c| format!("{c:.0}"))
                .unwrap_or_else(|| "N/A".to_string()),
            short_id(&item.id),
        ]);
    }
    Ok(table.render())
}

// ─────────────────────── collections ───────────────────────

pub fn render_collections(
    collections: &[Collection],
    all: bool,
    format: OutputFormat,
) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        return Ok(format!("{}\n", serde_json::to_string_pretty(collections)?));
    }

    let title = if all {
        format!("All Available Collections ({})", collections.len())
    } else {
        format!(
            "High-Resolution Taskable Collections ({}) - <=0.75m resolution",
            collections.len()
        )
    };

    let mut table = Table::new(title, &["Name", "Host", "Type", "Resolution"]);
    for c in collections {
        let resolution = c
            .min_resolution()
            .map(|m| format!("{m}m"))
            .or_else(|| c.resolution_class.clone())
            .unwrap_or_else(|| "N/A".to_string());
        table.push(vec![
            c.name.clone(),
            c.host_name.clone().unwrap_or_else(|| "N/A".to_string()),
            c.kind.clone().unwrap_or_else(|| "N/A".to_string()),
            resolution,
        ]);
    }
    Ok(table.render())
}

// ─────────────────────── hotspots ───────────────────────

pub fn activity_bar(count: usize) -> String {
    "█".repeat(count.min(MAX_BAR))
}

fn category_label(category: Category) -> (&'static str, bool) {
    match category {
        Category::Strategic => ("Strategic", true),
        Category::Airports => ("Airports", false),
        Category::Power => ("Power", true),
        Category::Transport => ("Transport", true),
        Category::Technology => ("Tech/Data", true),
        Category::Industrial => ("Industrial", false),
        Category::Healthcare => ("Healthcare", true),
        Category::Education => ("Education", false),
        Category::Commercial => ("Commercial", true),
        Category::Critical => ("Critical", true),
    }
}

/// "Name (type)" for typed categories, bare names otherwise. Unnamed
/// facilities show their type, or nothing when only names are listed.
fn describe_entries(entries: &[InfrastructureEntry], show_type: bool) -> String {
    if show_type {
        entries
            .iter()
            .take(2)
            .map(|e| {
                if e.name == UNNAMED {
                    e.facility_type.clone()
                } else {
                    format!("{} ({})", e.name, e.facility_type)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    } else {
        entries
            .iter()
            .take(3)
            .filter(|e| e.name != UNNAMED)
            .map(|e| e.name.clone())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn render_infrastructure(out: &mut String, status: &InfrastructureStatus) {
    match status {
        InfrastructureStatus::Failed { .. } => {
            let _ = writeln!(out, "      Infrastructure query failed");
        }
        InfrastructureStatus::Empty => {
            let _ = writeln!(out, "      No significant infrastructure found");
        }
        InfrastructureStatus::Found { categories } => {
            let _ = writeln!(out, "      Key infrastructure:");
            let lines = categories
                .iter()
                .filter_map(|(category, entries)| {
                    let (label, show_type) = category_label(category);
                    let listed = describe_entries(entries, show_type);
                    (!listed.is_empty()).then(|| format!("        • {label}: {listed}"))
                })
                .take(MAX_CATEGORIES_SHOWN);
            for line in lines {
                let _ = writeln!(out, "{line}");
            }
        }
    }
}

pub fn render_hotspots(summary: &HotspotSummary, format: OutputFormat) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        return Ok(format!("{}\n", serde_json::to_string_pretty(summary)?));
    }

    let analysis = &summary.analysis;
    if analysis.total_items == 0 {
        let mut out = String::from("No items found\n");
        for failure in &summary.failed_windows {
            let _ = writeln!(out, "  ! failed window {failure}");
        }
        return Ok(out);
    }

    let clusters = &analysis.clusters;
    let mut out = String::new();
    let _ = writeln!(out, "Activity Analysis");
    let _ = writeln!(out, "Total items: {}", analysis.total_items);
    let _ = writeln!(out, "Min threshold: {}", clusters.threshold);
    let _ = writeln!(out, "Raw locations found: {}", clusters.hotspots.len());
    let _ = writeln!(
        out,
        "Search: {} mode, {} windows",
        summary.mode, summary.windows_processed
    );
    for failure in &summary.failed_windows {
        let _ = writeln!(out, "  ! failed window {failure}");
    }
    for warning in &summary.warnings {
        let _ = writeln!(out, "  ! {warning}");
    }

    let _ = writeln!(out, "\nCollections:");
    for (collection, count) in &analysis.collections {
        let _ = writeln!(out, "  • {collection}: {count} items");
    }

    if !summary.hotspots.is_empty() {
        let total_found = clusters.hotspots.len();
        let _ = writeln!(out, "\nTop {} Hotspots:", summary.hotspots.len());
        if total_found > summary.hotspots.len() {
            let _ = writeln!(
                out,
                "({total_found} total locations with >={} items)",
                clusters.threshold.ceil()
            );
        }

        for entry in &summary.hotspots {
            let _ = writeln!(
                out,
                "\n  {:2}. {} ({}, {})",
                entry.rank, entry.place, entry.lat, entry.lon
            );
            let _ = writeln!(out, "      {} satellite images", entry.count);
            let _ = writeln!(out, "      {}", entry.earth_url);
            if let Some(status) = &entry.infrastructure {
                render_infrastructure(&mut out, status);
            }
        }
    }

    if !analysis.daily_activity.is_empty() {
        let _ = writeln!(out, "\nDaily Activity:");
        for (date, count) in &analysis.daily_activity {
            let _ = writeln!(out, "  {date}: {} ({count})", activity_bar(*count));
        }
    }

    Ok(out)
}

// ─────────────────────── watch ───────────────────────

pub fn render_watch(report: &WatchReport, format: OutputFormat) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        return Ok(format!("{}\n", serde_json::to_string_pretty(report)?));
    }

    if report.total_items == 0 {
        return Ok("No recent imagery found for this location\n".to_string());
    }

    let mut out = String::new();
    let _ = writeln!(out, "Imaging Timeline for {}:", report.place);
    for day in &report.timeline {
        let _ = writeln!(out, "\n{}:", day.date);
        for event in &day.events {
            let cloud = event
                .cloud_cover
                .map(|c| format!(", cloud: {c}%"))
                .unwrap_or_default();
            let _ = writeln!(out, "  • {} - {}{cloud}", event.time, event.collection);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stac_trace::infrastructure::InfrastructureReport;

    fn entry(name: &str, facility_type: &str, category: Category) -> InfrastructureEntry {
        InfrastructureEntry {
            name: name.into(),
            facility_type: facility_type.into(),
            category,
        }
    }

    #[test]
    fn test_table_pads_columns() {
        let mut table = Table::new("T", &["A", "Longer"]);
        table.push(vec!["wide cell".into(), "x".into()]);
        let text = table.render();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "T");
        assert_eq!(lines[1], "A          Longer");
        assert_eq!(lines[2], "---------  ------");
        assert_eq!(lines[3], "wide cell  x");
    }

    #[test]
    fn test_items_table_fields() {
        let item = CatalogItem::from_feature(json!({
            "bbox": [2.0, 48.0, 3.0, 49.0],
            "properties": {
                "id": "DS_PHR1A_202403011030123_FR1_PX_E002N48_0101_01234",
                "datetime": "2024-03-01T10:30:00Z",
                "constellation": "PHR",
                "providerProperties": { "cloudCover": 12.4 }
            }
        }));
        let text = render_items(&[item], OutputFormat::Table).unwrap();
        assert!(text.starts_with("Found 1 items\n"));
        assert!(text.contains("2024-03-01 10:30"));
        assert!(text.contains("48.50, 2.50"));
        assert!(text.contains("  12  "));
        assert!(text.contains("DS_PHR1A_202403011030123_..."));
    }

    #[test]
    fn test_items_empty() {
        assert_eq!(
            render_items(&[], OutputFormat::Table).unwrap(),
            "No items found\n"
        );
    }

    #[test]
    fn test_items_json_is_raw_features() {
        let item = CatalogItem::from_feature(json!({ "id": "x", "properties": {} }));
        let text = render_items(&[item], OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["id"], "x");
    }

    #[test]
    fn test_activity_bar_caps_width() {
        assert_eq!(activity_bar(3), "███");
        assert_eq!(activity_bar(80).chars().count(), 50);
    }

    #[test]
    fn test_describe_entries() {
        let typed = [
            entry("Camp Alpha", "base", Category::Strategic),
            entry(UNNAMED, "bunker", Category::Strategic),
            entry("Third", "range", Category::Strategic),
        ];
        assert_eq!(describe_entries(&typed, true), "Camp Alpha (base), bunker");

        let names = [
            entry(UNNAMED, "aerodrome", Category::Airports),
            entry("Orly", "aerodrome", Category::Airports),
        ];
        assert_eq!(describe_entries(&names, false), "Orly");
    }

    #[test]
    fn test_infrastructure_skips_categories_with_nothing_to_list() {
        let mut report = InfrastructureReport::default();
        report
            .categories
            .insert(Category::Airports, vec![entry(UNNAMED, "aerodrome", Category::Airports)]);
        report
            .categories
            .insert(Category::Power, vec![entry(UNNAMED, "plant", Category::Power)]);

        let mut out = String::new();
        render_infrastructure(&mut out, &InfrastructureStatus::Found { categories: report });
        assert_eq!(out, "      Key infrastructure:\n        • Power: plant\n");
    }
}
