//! HTTP client for the UP42 STAC catalog.
//!
//! [`authenticate`] exchanges credentials for a bearer token once per process.
//! [`StacClient`] issues single search attempts (it implements
//! [`CatalogSource`]; retries live in [`PageFetcher`](crate::fetcher::PageFetcher))
//! and lists imagery collections.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::fetcher::{CatalogSource, FetchFailure};
use crate::types::{
    CatalogItem, Collection, ContinuationToken, SearchCriteria, SearchPage, TimeWindow,
    TraceError, TraceResult, PAGE_CAP,
};

pub const DEFAULT_API_URL: &str = "https://api.up42.com";
pub const DEFAULT_AUTH_URL: &str = "https://auth.up42.com";

/// Collections at or below this resolution (metres) are treated as taskable.
pub const TASKABLE_MAX_RESOLUTION: f64 = 0.75;

const TOKEN_PATH: &str = "/realms/public/protocol/openid-connect/token";
const CLIENT_ID: &str = "up42-api";

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Bearer token for catalog requests.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .user_agent(concat!("stac-trace/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

/// OAuth password grant against `auth_url`. Any failure here is fatal for
/// the run.
pub async fn authenticate(auth_url: &str, credentials: &Credentials) -> TraceResult<AccessToken> {
    let endpoint = format!("{}{TOKEN_PATH}", auth_url.trim_end_matches('/'));
    let form = [
        ("username", credentials.username.as_str()),
        ("password", credentials.password.as_str()),
        ("grant_type", "password"),
        ("client_id", CLIENT_ID),
    ];

    let response = http_client()
        .post(&endpoint)
        .form(&form)
        .send()
        .await
        .map_err(|e| TraceError::Auth(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TraceError::Auth(format!("{} - {body}", status.as_u16())));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| TraceError::Auth(format!("invalid token response: {e}")))?;

    let token = token
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| TraceError::Auth("token response has no access_token".into()))?;

    tracing::info!("Authenticated as {}", credentials.username);
    Ok(AccessToken(token))
}

/// STAC search request body for one window.
pub fn search_body(criteria: &SearchCriteria, window: &TimeWindow, limit: usize) -> Value {
    let mut body = json!({
        "limit": limit.clamp(1, PAGE_CAP),
        "datetime": window.interval(),
    });

    if let Some(bbox) = criteria.bbox {
        body["bbox"] = json!(bbox.to_array());
    }
    if !criteria.collections.is_empty() {
        body["collections"] = json!(criteria.collections);
    }
    if let Some(cloud) = criteria.max_cloud_cover {
        body["query"] = json!({ "cloudCoverage": { "lte": cloud } });
    }

    body
}

/// Split a STAC feature collection into items and the `next` link.
pub fn parse_page(body: Value) -> Result<SearchPage, FetchFailure> {
    let Value::Object(mut body) = body else {
        return Err(FetchFailure::Malformed("expected a JSON object".into()));
    };

    let features = match body.remove("features") {
        Some(Value::Array(features)) => features,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => return Err(FetchFailure::Malformed("features is not an array".into())),
    };

    let next = body
        .get("links")
        .and_then(Value::as_array)
        .and_then(|links| {
            links
                .iter()
                .find(|link| link.get("rel").and_then(Value::as_str) == Some("next"))
        })
        .and_then(|link| link.get("href").and_then(Value::as_str))
        .map(|href| ContinuationToken(href.to_string()));

    Ok(SearchPage {
        items: features.into_iter().map(CatalogItem::from_feature).collect(),
        next,
    })
}

/// Collections whose best resolution is declared and at most `max_resolution`.
pub fn taskable_collections(collections: &[Collection], max_resolution: f64) -> Vec<Collection> {
    collections
        .iter()
        .filter(|c| {
            c.min_resolution()
                .is_some_and(|r| r > 0.0 && r <= max_resolution)
        })
        .cloned()
        .collect()
}

/// Authenticated catalog client. One attempt per call.
#[derive(Debug, Clone)]
pub struct StacClient {
    http: reqwest::Client,
    base_url: String,
    token: AccessToken,
}

impl StacClient {
    pub fn new(base_url: impl Into<String>, token: AccessToken) -> Self {
        Self {
            http: http_client(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Authenticate and build a client.
    pub async fn connect(
        base_url: impl Into<String>,
        auth_url: &str,
        credentials: &Credentials,
    ) -> TraceResult<Self> {
        let token = authenticate(auth_url, credentials).await?;
        Ok(Self::new(base_url, token))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn search_url(&self, host: &str) -> String {
        format!("{}/catalog/hosts/{host}/stac/search", self.base_url)
    }

    async fn read_page(response: reqwest::Response) -> Result<SearchPage, FetchFailure> {
        if let Some(failure) = FetchFailure::from_status(response.status().as_u16()) {
            return Err(failure);
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchFailure::Malformed(e.to_string()))?;
        parse_page(body)
    }

    /// All collections in the catalog.
    pub async fn list_collections(&self) -> TraceResult<Vec<Collection>> {
        let response = self
            .http
            .get(format!("{}/collections", self.base_url))
            .bearer_auth(self.token.as_str())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TraceError::Catalog(format!(
                "collections listing failed: {} - {body}",
                status.as_u16()
            )));
        }

        let body: Value = response.json().await?;
        let collections: Vec<Collection> = body
            .get("data")
            .and_then(Value::as_array)
            .map(|data| {
                data.iter()
                    .filter_map(|c| serde_json::from_value(c.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        tracing::debug!("Listed {} collections", collections.len());
        Ok(collections)
    }

    /// Names of collections at or below [`TASKABLE_MAX_RESOLUTION`].
    pub async fn taskable_collection_names(&self) -> TraceResult<Vec<String>> {
        let all = self.list_collections().await?;
        Ok(taskable_collections(&all, TASKABLE_MAX_RESOLUTION)
            .into_iter()
            .map(|c| c.name)
            .collect())
    }
}

#[async_trait]
impl CatalogSource for StacClient {
    async fn search(
        &self,
        criteria: &SearchCriteria,
        window: &TimeWindow,
        limit: usize,
    ) -> Result<SearchPage, FetchFailure> {
        let body = search_body(criteria, window, limit);
        tracing::debug!("Searching {} for {window}", criteria.host);

        let response = self
            .http
            .post(self.search_url(&criteria.host))
            .bearer_auth(self.token.as_str())
            .json(&body)
            .send()
            .await?;

        Self::read_page(response).await
    }

    async fn follow(&self, token: &ContinuationToken) -> Result<SearchPage, FetchFailure> {
        let response = self
            .http
            .get(token.as_str())
            .bearer_auth(self.token.as_str())
            .send()
            .await?;

        Self::read_page(response).await
    }
}
