//! Reverse geocoding to human-readable place names.
//!
//! Best effort only: any failure falls back to the coordinates formatted to
//! one decimal place.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::cache::BoundedCache;
use crate::types::GeoPoint;

/// Public Nominatim reverse endpoint.
pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/reverse";

const LOCALITY_KEYS: [&str; 5] = ["city", "town", "village", "municipality", "suburb"];
const REGION_KEYS: [&str; 3] = ["state", "region", "province"];

/// `"lat, lon"` with one decimal.
pub fn coordinate_label(point: GeoPoint) -> String {
    format!("{:.1}, {:.1}", point.lat, point.lon)
}

/// Turns a point into a place name. Never fails.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn place_name(&self, point: GeoPoint) -> String;
}

/// Geocoder that always answers with the coordinate label.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinateGeocoder;

#[async_trait]
impl ReverseGeocoder for CoordinateGeocoder {
    async fn place_name(&self, point: GeoPoint) -> String {
        coordinate_label(point)
    }
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: serde_json::Map<String, Value>,
}

/// Assemble "locality, region, country" from a Nominatim address block,
/// skipping parts that are missing.
pub fn compose_place_name(address: &serde_json::Map<String, Value>) -> Option<String> {
    let parts: Vec<&str> = [
        first_of(address, &LOCALITY_KEYS),
        first_of(address, &REGION_KEYS),
        address.get("country").and_then(Value::as_str),
    ]
    .into_iter()
    .flatten()
    .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

fn first_of<'a>(address: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| address.get(*key).and_then(Value::as_str))
}

/// Nominatim-backed geocoder with an injected cache keyed on the rounded point.
pub struct NominatimGeocoder {
    http: reqwest::Client,
    endpoint: String,
    cache: Arc<BoundedCache<String>>,
    courtesy_delay: Duration,
}

impl NominatimGeocoder {
    pub fn new(cache: Arc<BoundedCache<String>>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .user_agent(concat!("stac-trace/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            http,
            endpoint: DEFAULT_NOMINATIM_URL.to_string(),
            cache,
            courtesy_delay: Duration::from_millis(500),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Pause after each uncached lookup (the public service asks for ≤ 1 req/s).
    pub fn with_courtesy_delay(mut self, delay: Duration) -> Self {
        self.courtesy_delay = delay;
        self
    }

    async fn resolve(&self, point: GeoPoint) -> Result<String, reqwest::Error> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("lat", point.lat.to_string()),
                ("lon", point.lon.to_string()),
                ("format", "json".to_string()),
                ("zoom", "10".to_string()),
                ("accept-language", "en".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: ReverseResponse = response.json().await?;
        Ok(compose_place_name(&body.address).unwrap_or_else(|| coordinate_label(point)))
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn place_name(&self, point: GeoPoint) -> String {
        let key = format!("{:.1},{:.1}", point.lat, point.lon);
        if let Some(name) = self.cache.get(&key) {
            return name;
        }

        match self.resolve(point).await {
            Ok(name) => {
                self.cache.insert(key, name.clone());
                if !self.courtesy_delay.is_zero() {
                    tokio::time::sleep(self.courtesy_delay).await;
                }
                name
            }
            Err(e) => {
                tracing::debug!("Reverse geocoding failed for {key}: {e}");
                coordinate_label(point)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn address(value: Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_coordinate_label() {
        assert_eq!(coordinate_label(GeoPoint::new(48.8566, 2.3522)), "48.9, 2.4");
        assert_eq!(coordinate_label(GeoPoint::new(-3.0, 100.04)), "-3.0, 100.0");
    }

    #[test]
    fn test_compose_prefers_first_key_of_each_group() {
        let addr = address(json!({
            "town": "Villejuif",
            "suburb": "Centre",
            "region": "Ile-de-France",
            "province": "ignored",
            "country": "France"
        }));
        assert_eq!(
            compose_place_name(&addr).as_deref(),
            Some("Villejuif, Ile-de-France, France")
        );
    }

    #[test]
    fn test_compose_skips_missing_parts() {
        let addr = address(json!({ "country": "Chile" }));
        assert_eq!(compose_place_name(&addr).as_deref(), Some("Chile"));
        assert_eq!(compose_place_name(&serde_json::Map::new()), None);
    }

    #[tokio::test]
    async fn test_coordinate_geocoder() {
        let name = CoordinateGeocoder.place_name(GeoPoint::new(1.26, 2.0)).await;
        assert_eq!(name, "1.3, 2.0");
    }
}
