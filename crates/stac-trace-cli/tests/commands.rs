//! Command handlers end to end against a wiremock catalog.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stac_trace::catalog::{AccessToken, StacClient};
use stac_trace::geocode::{CoordinateGeocoder, ReverseGeocoder};
use stac_trace::infrastructure::{InfrastructureError, InfrastructureLookup, InfrastructureReport};
use stac_trace::progress::{self, ProgressEventKind};
use stac_trace::types::GeoPoint;

use stac_trace_cli::commands::{
    self, HotspotOptions, InfrastructureStatus, Lookups, SearchOptions, WatchOptions,
};
use stac_trace_cli::output::{self, OutputFormat};

// ─────────────────────── helpers ───────────────────────

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
}

fn client(server: &MockServer) -> StacClient {
    StacClient::new(server.uri(), AccessToken::new("tok"))
}

fn feature(id: &str, datetime: &str, lat: f64, lon: f64) -> Value {
    json!({
        "id": id,
        "properties": {
            "datetime": datetime,
            "constellation": "PHR",
            "providerProperties": {
                "geometryCentroid": { "lat": lat, "lon": lon },
                "cloudCover": 5.0
            }
        }
    })
}

async fn mount_collections(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/collections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "name": "spot", "hostName": "oneatlas", "type": "ARCHIVE",
                  "resolutionValue": { "minimum": 1.5 } },
                { "name": "sentinel", "resolutionClass": "LOW" },
                { "name": "pneo", "hostName": "oneatlas", "type": "ARCHIVE",
                  "resolutionValue": { "minimum": 0.3 } },
                { "name": "phr", "hostName": "oneatlas", "type": "ARCHIVE",
                  "resolutionValue": { "minimum": 0.5 } }
            ]
        })))
        .mount(server)
        .await;
}

struct Named(&'static str);

#[async_trait]
impl ReverseGeocoder for Named {
    async fn place_name(&self, _point: GeoPoint) -> String {
        self.0.to_string()
    }
}

struct Offline;

#[async_trait]
impl InfrastructureLookup for Offline {
    async fn lookup(
        &self,
        _point: GeoPoint,
        _radius_km: f64,
    ) -> Result<InfrastructureReport, InfrastructureError> {
        Err(InfrastructureError::Unavailable("server error: 504".into()))
    }
}

// ─────────────────────── collections ───────────────────────

#[tokio::test]
async fn test_collections_taskable_sorted_by_resolution() {
    let server = MockServer::start().await;
    mount_collections(&server).await;

    let taskable = commands::collections(&client(&server), false).await.unwrap();
    let names: Vec<_> = taskable.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["pneo", "phr"]);

    let all = commands::collections(&client(&server), true).await.unwrap();
    let names: Vec<_> = all.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["pneo", "phr", "spot", "sentinel"]);

    let text = output::render_collections(&all, true, OutputFormat::Table).unwrap();
    assert!(text.starts_with("All Available Collections (4)\n"));
    assert!(text.contains("0.3m"));
    assert!(text.contains("LOW"));
}

// ─────────────────────── search ───────────────────────

#[tokio::test]
async fn test_search_single_page_reports_more_available() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/catalog/hosts/oneatlas/stac/search"))
        .and(body_partial_json(json!({
            "limit": 2,
            "collections": ["phr"],
            "bbox": [2.0, 48.0, 3.0, 49.0]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "features": [
                feature("a", "2024-03-09T10:00:00Z", 48.5, 2.5),
                feature("b", "2024-03-08T10:00:00Z", 48.5, 2.5)
            ],
            "links": [{ "rel": "next", "href": format!("{}/next", server.uri()) }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let options = SearchOptions {
        host: "oneatlas".into(),
        bbox: Some(stac_trace::types::BoundingBox::parse("2,48,3,49").unwrap()),
        days: 30,
        collection: Some("phr".into()),
        cloud: None,
        limit: 2,
    };
    let results = commands::search(&client(&server), &options, now()).await.unwrap();
    assert_eq!(results.items.len(), 2);
    assert!(results.more_available);
    assert_eq!(results.range.end(), now());
}

#[tokio::test]
async fn test_search_permanent_failure_has_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let options = SearchOptions {
        host: "oneatlas".into(),
        bbox: None,
        days: 7,
        collection: None,
        cloud: Some(20),
        limit: 100,
    };
    let err = commands::search(&client(&server), &options, now())
        .await
        .unwrap_err();
    let text = format!("{err:#}");
    assert!(text.contains("Search on oneatlas failed"), "{text}");
    assert!(text.contains("client error: 400"), "{text}");
}

// ─────────────────────── hotspots ───────────────────────

#[tokio::test]
async fn test_hotspots_pipeline() {
    let server = MockServer::start().await;
    mount_collections(&server).await;

    let mut features: Vec<Value> = (0..12)
        .map(|i| feature(&format!("p{i}"), "2024-03-10T08:00:00Z", 48.3, 2.4))
        .collect();
    features.push(feature("lone", "2024-03-10T09:00:00Z", 10.5, 10.5));

    Mock::given(method("POST"))
        .and(path("/catalog/hosts/oneatlas/stac/search"))
        .and(body_partial_json(json!({ "collections": ["pneo", "phr"], "limit": 500 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "features": features })))
        .expect(1)
        .mount(&server)
        .await;

    let options = HotspotOptions {
        host: "oneatlas".into(),
        days: 1,
        bbox: None,
        infra: true,
        min_chunk_hours: 1,
        workers: 4,
    };
    let lookups = Lookups {
        geocoder: &CoordinateGeocoder,
        infrastructure: Some(&Offline),
    };
    let (tx, mut rx) = progress::channel();

    let summary = commands::hotspots(&client(&server), &options, now(), lookups, Some(tx))
        .await
        .unwrap();

    assert_eq!(summary.mode, "single");
    assert_eq!(summary.windows_processed, 1);
    assert!(summary.failed_windows.is_empty());
    assert_eq!(summary.analysis.total_items, 13);
    assert_eq!(summary.analysis.clusters.threshold, 5.0);
    assert_eq!(summary.hotspots.len(), 1);

    let top = &summary.hotspots[0];
    assert_eq!((top.lat, top.lon, top.count), (48, 2, 12));
    assert_eq!(top.place, "48.0, 2.0");
    assert!(top.earth_url.contains("@48,2,"));
    assert!(matches!(
        top.infrastructure,
        Some(InfrastructureStatus::Failed { .. })
    ));

    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        last = Some(event.event);
    }
    assert!(matches!(
        last,
        Some(ProgressEventKind::SearchComplete { items: 13, failures: 0, .. })
    ));

    let text = output::render_hotspots(&summary, OutputFormat::Table).unwrap();
    assert!(text.contains("Total items: 13"));
    assert!(text.contains("Top 1 Hotspots:"));
    assert!(text.contains("   1. 48.0, 2.0 (48, 2)"));
    assert!(text.contains("Infrastructure query failed"));
    assert!(text.contains("2024-03-10: █████████████ (13)"));

    let json: Value =
        serde_json::from_str(&output::render_hotspots(&summary, OutputFormat::Json).unwrap())
            .unwrap();
    assert_eq!(json["hotspots"][0]["infrastructure"]["status"], "failed");
}

#[tokio::test]
async fn test_hotspots_failed_window_is_reported_not_fatal() {
    let server = MockServer::start().await;
    mount_collections(&server).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let options = HotspotOptions {
        host: "oneatlas".into(),
        days: 1,
        bbox: None,
        infra: false,
        min_chunk_hours: 1,
        workers: 4,
    };
    let lookups = Lookups {
        geocoder: &CoordinateGeocoder,
        infrastructure: None,
    };

    let summary = commands::hotspots(&client(&server), &options, now(), lookups, None)
        .await
        .unwrap();
    assert_eq!(summary.analysis.total_items, 0);
    assert_eq!(summary.failed_windows.len(), 1);
    assert!(summary.failed_windows[0].contains("client error: 403"));

    let text = output::render_hotspots(&summary, OutputFormat::Table).unwrap();
    assert!(text.starts_with("No items found\n"));
}

#[tokio::test]
async fn test_hotspots_rejects_zero_workers() {
    let server = MockServer::start().await;
    let options = HotspotOptions {
        host: "oneatlas".into(),
        days: 7,
        bbox: None,
        infra: false,
        min_chunk_hours: 1,
        workers: 0,
    };
    let lookups = Lookups {
        geocoder: &CoordinateGeocoder,
        infrastructure: None,
    };
    assert!(
        commands::hotspots(&client(&server), &options, now(), lookups, None)
            .await
            .is_err()
    );
}

// ─────────────────────── watch ───────────────────────

#[tokio::test]
async fn test_watch_timeline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/catalog/hosts/oneatlas/stac/search"))
        .and(body_partial_json(json!({ "limit": 100 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "features": [
                feature("a", "2024-03-01T10:30:00Z", 48.85, 2.35),
                feature("b", "2024-03-05T11:00:00Z", 48.85, 2.35),
                feature("c", "2024-03-01T14:15:00Z", 48.85, 2.35)
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let options = WatchOptions {
        lat: 48.85,
        lon: 2.35,
        host: "oneatlas".into(),
        radius: 0.1,
        days: 30,
    };
    let report = commands::watch(&client(&server), &options, now(), &Named("Paris"))
        .await
        .unwrap();

    assert_eq!(report.place, "Paris");
    assert_eq!(report.total_items, 3);
    let dates: Vec<_> = report.timeline.iter().map(|d| d.date.as_str()).collect();
    assert_eq!(dates, vec!["2024-03-05", "2024-03-01"]);

    let text = output::render_watch(&report, OutputFormat::Table).unwrap();
    assert!(text.starts_with("Imaging Timeline for Paris:\n"));
    assert!(text.contains("  • 10:30 - PHR, cloud: 5%\n  • 14:15 - PHR, cloud: 5%"));
}

#[tokio::test]
async fn test_watch_no_imagery() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "features": [] })))
        .mount(&server)
        .await;

    let options = WatchOptions {
        lat: -33.87,
        lon: 151.21,
        host: "oneatlas".into(),
        radius: 0.1,
        days: 30,
    };
    let report = commands::watch(&client(&server), &options, now(), &CoordinateGeocoder)
        .await
        .unwrap();
    assert_eq!(report.place, "-33.9, 151.2");
    assert_eq!(
        output::render_watch(&report, OutputFormat::Table).unwrap(),
        "No recent imagery found for this location\n"
    );
}

#[tokio::test]
async fn test_watch_rejects_bad_radius() {
    let server = MockServer::start().await;
    let options = WatchOptions {
        lat: 0.0,
        lon: 0.0,
        host: "oneatlas".into(),
        radius: 0.0,
        days: 30,
    };
    assert!(
        commands::watch(&client(&server), &options, now(), &CoordinateGeocoder)
            .await
            .is_err()
    );
}
