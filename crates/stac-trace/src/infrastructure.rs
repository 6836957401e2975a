//! Infrastructure around a hotspot: categorisation, ranking, and lookup.
//!
//! Raw map features come from an Overpass-style endpoint. Each one is scored
//! with [`significance_score`], sorted into at most one [`Category`] by an
//! ordered list of first-match rules, and the top entries of every category
//! are kept. Scores are internal; the public [`InfrastructureEntry`] drops it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cache::BoundedCache;
use crate::fetcher::{retry_with_policy, FetchFailure, RetryPolicy};
use crate::scoring::{significance_score, ElementKind, Tags, UNNAMED};
use crate::types::GeoPoint;

/// Public Overpass interpreter.
pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Search radius used by the hotspot report.
pub const DEFAULT_RADIUS_KM: f64 = 3.0;

/// Elements scoring below this and lacking a name are dropped.
const MIN_UNNAMED_SCORE: u32 = 15;

/// Infrastructure category, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Strategic,
    Airports,
    Power,
    Transport,
    Technology,
    Industrial,
    Healthcare,
    Education,
    Commercial,
    Critical,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Strategic,
        Category::Airports,
        Category::Power,
        Category::Transport,
        Category::Technology,
        Category::Industrial,
        Category::Healthcare,
        Category::Education,
        Category::Commercial,
        Category::Critical,
    ];

    /// Maximum entries kept per category.
    pub fn limit(self) -> usize {
        match self {
            Category::Strategic => 5,
            Category::Transport => 4,
            Category::Healthcare | Category::Critical => 2,
            Category::Airports
            | Category::Power
            | Category::Technology
            | Category::Industrial
            | Category::Education
            | Category::Commercial => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Strategic => "strategic",
            Category::Airports => "airports",
            Category::Power => "power",
            Category::Transport => "transport",
            Category::Technology => "technology",
            Category::Industrial => "industrial",
            Category::Healthcare => "healthcare",
            Category::Education => "education",
            Category::Commercial => "commercial",
            Category::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw map feature as returned by the lookup service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverpassElement {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub tags: Tags,
}

impl OverpassElement {
    pub fn new(kind: &str, tags: Tags) -> Self {
        Self {
            kind: kind.to_string(),
            tags,
        }
    }

    /// `name`, then `operator`, then the unnamed sentinel.
    pub fn display_name(&self) -> String {
        self.tags
            .get("name")
            .or_else(|| self.tags.get("operator"))
            .cloned()
            .unwrap_or_else(|| UNNAMED.to_string())
    }
}

/// A categorised element with its internal score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredElement {
    pub name: String,
    pub facility_type: String,
    pub category: Category,
    pub score: u32,
}

impl ScoredElement {
    /// Public view: everything except the score.
    pub fn entry(&self) -> InfrastructureEntry {
        InfrastructureEntry {
            name: self.name.clone(),
            facility_type: self.facility_type.clone(),
            category: self.category,
        }
    }
}

impl From<ScoredElement> for InfrastructureEntry {
    fn from(element: ScoredElement) -> Self {
        Self {
            name: element.name,
            facility_type: element.facility_type,
            category: element.category,
        }
    }
}

/// One ranked facility as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfrastructureEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub facility_type: String,
    pub category: Category,
}

/// Ranked facilities grouped by category. Empty categories are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InfrastructureReport {
    pub categories: BTreeMap<Category, Vec<InfrastructureEntry>>,
}

impl InfrastructureReport {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn get(&self, category: Category) -> &[InfrastructureEntry] {
        self.categories
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of entries across categories.
    pub fn len(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    /// Categories in display order with their entries.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &[InfrastructureEntry])> {
        self.categories
            .iter()
            .map(|(category, entries)| (*category, entries.as_slice()))
    }
}

fn tag<'a>(tags: &'a Tags, key: &str) -> Option<&'a str> {
    tags.get(key).map(String::as_str)
}

fn is(tags: &Tags, key: &str, value: &str) -> bool {
    tag(tags, key) == Some(value)
}

fn tag_or(tags: &Tags, key: &str, fallback: &str) -> String {
    tag(tags, key).unwrap_or(fallback).to_string()
}

/// First matching category and a facility label, or `None` when the element
/// fits nowhere. Some rules only apply above a score floor.
pub fn categorize(tags: &Tags, score: u32) -> Option<(Category, String)> {
    let hit = |category: Category, label: String| Some((category, label));

    if let Some(kind) = tag(tags, "military") {
        return hit(Category::Strategic, kind.to_string());
    }
    if is(tags, "amenity", "embassy") {
        return hit(Category::Strategic, "embassy".into());
    }
    if is(tags, "amenity", "government") || is(tags, "office", "government") {
        return hit(Category::Strategic, tag_or(tags, "government", "office"));
    }
    if is(tags, "aeroway", "aerodrome") {
        return hit(Category::Airports, tag_or(tags, "aerodrome:type", "airport"));
    }
    if is(tags, "power", "plant") {
        let source = tag(tags, "plant:source").unwrap_or("unknown");
        return hit(Category::Power, format!("power plant ({source})"));
    }
    if is(tags, "power", "substation") && score >= 20 {
        return hit(Category::Power, "substation".into());
    }
    if is(tags, "railway", "station") {
        return hit(Category::Transport, "railway station".into());
    }
    if tags.contains_key("harbour") || is(tags, "landuse", "harbour") {
        return hit(Category::Transport, "port/harbour".into());
    }
    if is(tags, "aeroway", "terminal") {
        return hit(Category::Transport, "airport terminal".into());
    }
    if is(tags, "telecom", "data_center") || is(tags, "building", "data_center") {
        return hit(Category::Technology, "data center".into());
    }
    if is(tags, "amenity", "hospital") {
        let label = match tag(tags, "beds").filter(|b| !b.is_empty()) {
            Some(beds) => format!("hospital ({beds} beds)"),
            None => "hospital".to_string(),
        };
        return hit(Category::Healthcare, label);
    }
    if is(tags, "amenity", "university") {
        return hit(Category::Education, "university".into());
    }
    if is(tags, "amenity", "research_institute") {
        return hit(
            Category::Education,
            tag_or(tags, "research", "research institute"),
        );
    }
    if is(tags, "landuse", "industrial") || is(tags, "man_made", "works") {
        let label = tag(tags, "industrial")
            .or_else(|| tag(tags, "product"))
            .unwrap_or("industrial facility");
        return hit(Category::Industrial, label.to_string());
    }
    if is(tags, "shop", "mall") {
        return hit(Category::Commercial, "shopping mall".into());
    }
    if is(tags, "amenity", "bank") {
        return hit(Category::Commercial, "bank".into());
    }
    if is(tags, "office", "company") && score >= 30 {
        return hit(Category::Commercial, "corporate office".into());
    }
    if is(tags, "tourism", "hotel") && score >= 25 {
        return hit(Category::Commercial, "hotel".into());
    }
    if is(tags, "building", "commercial") && score >= 35 {
        let label = match tag(tags, "building:levels").filter(|l| !l.is_empty()) {
            Some(levels) => format!("commercial building ({levels} floors)"),
            None => "commercial building".to_string(),
        };
        return hit(Category::Commercial, label);
    }
    if is(tags, "amenity", "prison") {
        return hit(Category::Critical, "prison".into());
    }

    None
}

/// Score and categorise one element. Low-scoring unnamed and
/// uncategorised elements yield `None`.
pub fn score_element(element: &OverpassElement) -> Option<ScoredElement> {
    let name = element.display_name();
    let score = significance_score(ElementKind::parse(&element.kind), &element.tags);

    if score < MIN_UNNAMED_SCORE && name == UNNAMED {
        return None;
    }

    let (category, facility_type) = categorize(&element.tags, score)?;
    Some(ScoredElement {
        name,
        facility_type,
        category,
        score,
    })
}

/// Rank elements: highest score first, capped per category.
pub fn rank_elements(elements: &[OverpassElement]) -> InfrastructureReport {
    let mut scored: Vec<ScoredElement> = elements.iter().filter_map(score_element).collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score));

    let mut report = InfrastructureReport::default();
    for element in scored {
        let entries = report.categories.entry(element.category).or_default();
        if entries.len() < element.category.limit() {
            entries.push(element.into());
        }
    }

    tracing::debug!(
        "Ranked {} of {} elements into {} categories",
        report.len(),
        elements.len(),
        report.categories.len()
    );

    report
}

/// Lookup failures collapse into a single signal.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InfrastructureError {
    #[error("infrastructure unavailable: {0}")]
    Unavailable(String),
}

impl From<FetchFailure> for InfrastructureError {
    fn from(failure: FetchFailure) -> Self {
        InfrastructureError::Unavailable(failure.to_string())
    }
}

/// Source of ranked infrastructure around a point.
#[async_trait]
pub trait InfrastructureLookup: Send + Sync {
    async fn lookup(
        &self,
        point: GeoPoint,
        radius_km: f64,
    ) -> Result<InfrastructureReport, InfrastructureError>;
}

/// Overpass QL query for significant features within `radius_km` of `point`.
pub fn overpass_query(point: GeoPoint, radius_km: f64) -> String {
    let around = format!("(around:{:.0},{},{})", radius_km * 1000.0, point.lat, point.lon);
    let selectors = [
        r#"way["military"]"#,
        r#"relation["military"]"#,
        r#"way["aeroway"="aerodrome"]"#,
        r#"way["amenity"="government"]["name"]"#,
        r#"way["office"="government"]["name"]"#,
        r#"way["power"="plant"]"#,
        r#"way["landuse"="industrial"]["name"]"#,
        r#"way["harbour"]"#,
        r#"way["landuse"="harbour"]"#,
        r#"way["amenity"="embassy"]"#,
        r#"way["amenity"="prison"]"#,
        r#"way["amenity"="hospital"]["name"]"#,
        r#"way["railway"="station"]["name"]"#,
    ];

    let mut query = String::from("[out:json][timeout:25];\n(\n");
    for selector in selectors {
        query.push_str("  ");
        query.push_str(selector);
        query.push_str(&around);
        query.push_str(";\n");
    }
    query.push_str(");\nout body;\n>;\nout skel qt;\n");
    query
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

/// Overpass-backed lookup with retry and an injected result cache.
pub struct OverpassClient {
    http: reqwest::Client,
    endpoint: String,
    policy: RetryPolicy,
    cache: Arc<BoundedCache<InfrastructureReport>>,
    courtesy_delay: Duration,
}

impl OverpassClient {
    pub fn new(cache: Arc<BoundedCache<InfrastructureReport>>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("stac-trace/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            http,
            endpoint: DEFAULT_OVERPASS_URL.to_string(),
            policy: RetryPolicy::default(),
            cache,
            courtesy_delay: Duration::from_millis(500),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Pause after each uncached query to go easy on the public service.
    pub fn with_courtesy_delay(mut self, delay: Duration) -> Self {
        self.courtesy_delay = delay;
        self
    }

    fn cache_key(point: GeoPoint, radius_km: f64) -> String {
        format!("{:.1},{:.1},{radius_km}", point.lat, point.lon)
    }

    async fn query_once(&self, query: &str) -> Result<Vec<OverpassElement>, FetchFailure> {
        let response = self
            .http
            .post(&self.endpoint)
            .body(query.to_string())
            .send()
            .await?;

        if let Some(failure) = FetchFailure::from_status(response.status().as_u16()) {
            return Err(failure);
        }

        let body: OverpassResponse = response
            .json()
            .await
            .map_err(|e| FetchFailure::Malformed(e.to_string()))?;
        Ok(body.elements)
    }
}

#[async_trait]
impl InfrastructureLookup for OverpassClient {
    async fn lookup(
        &self,
        point: GeoPoint,
        radius_km: f64,
    ) -> Result<InfrastructureReport, InfrastructureError> {
        let key = Self::cache_key(point, radius_km);
        if let Some(report) = self.cache.get(&key) {
            tracing::debug!("Infrastructure cache hit for {key}");
            return Ok(report);
        }

        let query = overpass_query(point, radius_km);
        let elements = retry_with_policy(&self.policy, "Overpass", || self.query_once(&query))
            .await?;

        let report = rank_elements(&elements);
        self.cache.insert(key, report.clone());

        if !self.courtesy_delay.is_zero() {
            tokio::time::sleep(self.courtesy_delay).await;
        }

        Ok(report)
    }
}
