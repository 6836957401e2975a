//! Core data types for catalog records, time windows, and hotspots.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum number of items the catalog returns in one response.
pub const PAGE_CAP: usize = 500;

/// A WGS84 point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Finite and within ±90° latitude, ±180° longitude.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Axis-aligned bounding box in STAC order (min_lon, min_lat, max_lon, max_lat).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Build from the first four values of a STAC `bbox` array.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        if values.len() < 4 {
            return None;
        }
        Some(Self {
            min_lon: values[0],
            min_lat: values[1],
            max_lon: values[2],
            max_lat: values[3],
        })
    }

    /// Parse `"min_lon,min_lat,max_lon,max_lat"`.
    pub fn parse(text: &str) -> TraceResult<Self> {
        let values = text
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TraceError::InvalidInput(format!("Invalid bbox format: {e}")))?;

        if values.len() != 4 {
            return Err(TraceError::InvalidInput(format!(
                "bbox must have 4 values, got {}",
                values.len()
            )));
        }

        Ok(Self {
            min_lon: values[0],
            min_lat: values[1],
            max_lon: values[2],
            max_lat: values[3],
        })
    }

    /// Square box of `radius` degrees around a point.
    pub fn around(point: GeoPoint, radius: f64) -> Self {
        Self {
            min_lon: point.lon - radius,
            min_lat: point.lat - radius,
            max_lon: point.lon + radius,
            max_lat: point.lat + radius,
        }
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            lat: (self.min_lat + self.max_lat) / 2.0,
            lon: (self.min_lon + self.max_lon) / 2.0,
        }
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

/// One imagery record returned by the catalog.
///
/// Identity is the provider-assigned `id`. The original feature JSON is kept
/// in `raw` so callers can render it verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub datetime: Option<DateTime<Utc>>,
    pub collection: String,
    pub centroid: Option<GeoPoint>,
    pub bbox: Option<BoundingBox>,
    pub cloud_cover: Option<f64>,
    #[serde(default)]
    pub raw: Value,
}

impl CatalogItem {
    /// Build an item from a STAC feature, tolerating provider-specific fields.
    pub fn from_feature(feature: Value) -> Self {
        let properties = feature.get("properties").cloned().unwrap_or(Value::Null);
        let provider = properties
            .get("providerProperties")
            .cloned()
            .unwrap_or(Value::Null);

        let id = str_field(&properties, "id")
            .or_else(|| str_field(&provider, "sourceIdentifier"))
            .or_else(|| str_field(&feature, "id"))
            .unwrap_or_default();

        let datetime = str_field(&properties, "datetime")
            .or_else(|| str_field(&provider, "acquisitionDate"))
            .or_else(|| str_field(&provider, "publicationDate"))
            .and_then(|s| parse_timestamp(&s));

        let collection = str_field(&properties, "constellation")
            .or_else(|| str_field(&properties, "collection"))
            .unwrap_or_else(|| "unknown".to_string());

        let centroid = provider
            .get("geometryCentroid")
            .filter(|c| c.as_object().is_some_and(|m| !m.is_empty()))
            .map(|c| GeoPoint {
                lat: c.get("lat").and_then(Value::as_f64).unwrap_or(0.0),
                lon: c.get("lon").and_then(Value::as_f64).unwrap_or(0.0),
            });

        let bbox = feature
            .get("bbox")
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_f64).collect::<Vec<_>>())
            .and_then(|values| BoundingBox::from_slice(&values));

        let cloud_cover = provider
            .get("cloudCover")
            .and_then(Value::as_f64)
            .or_else(|| properties.get("eo:cloud_cover").and_then(Value::as_f64));

        Self {
            id,
            datetime,
            collection,
            centroid,
            bbox,
            cloud_cover,
            raw: feature,
        }
    }

    /// Resolve the item's location: explicit centroid first, then bbox midpoint.
    /// Out-of-range coordinates count as no location.
    pub fn location(&self) -> Option<GeoPoint> {
        self.centroid
            .filter(GeoPoint::is_valid)
            .or_else(|| self.bbox.map(|b| b.center()).filter(GeoPoint::is_valid))
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse an RFC 3339 timestamp, accepting a trailing `Z`.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Format a timestamp the way the catalog expects (`2024-01-01T00:00:00Z`).
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Half-open time interval `[start, end)` used as one catalog query unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window; `start` must be strictly before `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> TraceResult<Self> {
        if start >= end {
            return Err(TraceError::InvalidInput(format!(
                "time window start {} is not before end {}",
                format_timestamp(&start),
                format_timestamp(&end)
            )));
        }
        Ok(Self { start, end })
    }

    /// The `days` days leading up to `now`.
    pub fn last_days(days: u32, now: DateTime<Utc>) -> TraceResult<Self> {
        Self::new(now - Duration::days(i64::from(days)), now)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    /// STAC `datetime` interval string (`start/end`).
    pub fn interval(&self) -> String {
        format!(
            "{}/{}",
            format_timestamp(&self.start),
            format_timestamp(&self.end)
        )
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.span() >= Duration::days(1) {
            write!(
                f,
                "{} to {}",
                self.start.format("%Y-%m-%d"),
                self.end.format("%Y-%m-%d")
            )
        } else {
            write!(
                f,
                "{} to {}",
                self.start.format("%Y-%m-%d %H:%M"),
                self.end.format("%Y-%m-%d %H:%M")
            )
        }
    }
}

/// Opaque reference to the next page of a query (the STAC `next` link).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationToken(pub String);

impl ContinuationToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One response from the catalog.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub items: Vec<CatalogItem>,
    pub next: Option<ContinuationToken>,
}

impl SearchPage {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the page is at the cap, i.e. the window may be truncated.
    pub fn is_full(&self, page_cap: usize) -> bool {
        self.items.len() >= page_cap
    }
}

/// Filters applied to every window of a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub host: String,
    pub bbox: Option<BoundingBox>,
    pub collections: Vec<String>,
    pub max_cloud_cover: Option<u8>,
    pub page_size: usize,
}

impl SearchCriteria {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            bbox: None,
            collections: Vec::new(),
            max_cloud_cover: None,
            page_size: PAGE_CAP,
        }
    }

    pub fn with_bbox(mut self, bbox: Option<BoundingBox>) -> Self {
        self.bbox = bbox;
        self
    }

    pub fn with_collections(mut self, collections: Vec<String>) -> Self {
        self.collections = collections;
        self
    }

    pub fn with_max_cloud_cover(mut self, cloud: Option<u8>) -> Self {
        self.max_cloud_cover = cloud;
        self
    }

    /// Page size is clamped to `1..=PAGE_CAP`.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.clamp(1, PAGE_CAP);
        self
    }
}

/// An imagery collection from the collections listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    #[serde(rename = "hostName", default)]
    pub host_name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(rename = "resolutionValue", default)]
    pub resolution: Option<ResolutionValue>,
    #[serde(rename = "resolutionClass", default)]
    pub resolution_class: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionValue {
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

impl Collection {
    /// Best (smallest) ground resolution in metres, if declared.
    pub fn min_resolution(&self) -> Option<f64> {
        self.resolution.as_ref().and_then(|r| r.minimum)
    }
}

/// A cluster of above-threshold imaging activity on the 1° grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotspot {
    pub lat: i32,
    pub lon: i32,
    pub count: usize,
}

impl Hotspot {
    pub fn key(&self) -> (i32, i32) {
        (self.lat, self.lon)
    }
}

/// Errors that can occur in the stac-trace library.
#[derive(thiserror::Error, Debug)]
pub enum TraceError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience result type.
pub type TraceResult<T> = Result<T, TraceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_item_prefers_centroid() {
        let item = CatalogItem::from_feature(json!({
            "id": "feature-1",
            "bbox": [10.0, 20.0, 12.0, 22.0],
            "properties": {
                "datetime": "2024-03-01T10:15:00Z",
                "constellation": "PHR",
                "providerProperties": {
                    "geometryCentroid": { "lat": 48.5, "lon": 2.3 },
                    "cloudCover": 12.5
                }
            }
        }));
        assert_eq!(item.id, "feature-1");
        assert_eq!(item.collection, "PHR");
        assert_eq!(item.cloud_cover, Some(12.5));
        assert_eq!(item.location(), Some(GeoPoint::new(48.5, 2.3)));
        assert_eq!(
            item.datetime,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap())
        );
    }

    #[test]
    fn test_item_falls_back_to_bbox_midpoint() {
        let item = CatalogItem::from_feature(json!({
            "bbox": [10.0, 20.0, 12.0, 22.0],
            "properties": {
                "collection": "spot",
                "providerProperties": {
                    "sourceIdentifier": "src-9",
                    "acquisitionDate": "2024-03-02T00:00:00+00:00"
                }
            }
        }));
        assert_eq!(item.id, "src-9");
        assert_eq!(item.collection, "spot");
        assert_eq!(item.location(), Some(GeoPoint::new(21.0, 11.0)));
        assert!(item.datetime.is_some());
    }

    #[test]
    fn test_item_without_location() {
        let item = CatalogItem::from_feature(json!({ "properties": {} }));
        assert_eq!(item.collection, "unknown");
        assert!(item.location().is_none());
        assert!(item.datetime.is_none());
    }

    #[test]
    fn test_empty_centroid_uses_bbox() {
        let item = CatalogItem::from_feature(json!({
            "id": "x",
            "bbox": [0.0, 0.0, 2.0, 4.0],
            "properties": { "providerProperties": { "geometryCentroid": {} } }
        }));
        assert_eq!(item.location(), Some(GeoPoint::new(2.0, 1.0)));
    }

    #[test]
    fn test_out_of_range_centroid_is_unlocatable() {
        let item = CatalogItem::from_feature(json!({
            "id": "bad",
            "properties": { "providerProperties": { "geometryCentroid": { "lat": 1e12, "lon": 5.0 } } }
        }));
        assert!(item.location().is_none());

        let with_bbox = CatalogItem::from_feature(json!({
            "id": "bad-centroid",
            "bbox": [0.0, 0.0, 2.0, 4.0],
            "properties": { "providerProperties": { "geometryCentroid": { "lat": 91.0, "lon": 5.0 } } }
        }));
        assert_eq!(with_bbox.location(), Some(GeoPoint::new(2.0, 1.0)));
    }

    #[test]
    fn test_time_window_rejects_empty() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(TimeWindow::new(t, t).is_err());
        assert!(TimeWindow::new(t + Duration::hours(1), t).is_err());
    }

    #[test]
    fn test_time_window_interval() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let window = TimeWindow::new(start, start + Duration::days(1)).unwrap();
        assert_eq!(
            window.interval(),
            "2024-01-01T00:00:00Z/2024-01-02T00:00:00Z"
        );
        assert_eq!(window.to_string(), "2024-01-01 to 2024-01-02");
    }

    #[test]
    fn test_bbox_parse() {
        let bbox = BoundingBox::parse("1.5, 2, 3,4").unwrap();
        assert_eq!(bbox.to_array(), [1.5, 2.0, 3.0, 4.0]);
        assert!(BoundingBox::parse("1,2,3").is_err());
        assert!(BoundingBox::parse("a,b,c,d").is_err());
    }

    #[test]
    fn test_page_size_clamped() {
        let criteria = SearchCriteria::new("oneatlas").with_page_size(10_000);
        assert_eq!(criteria.page_size, PAGE_CAP);
    }
}
