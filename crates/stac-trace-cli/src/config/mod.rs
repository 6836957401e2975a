//! Configuration loading and resolution.
//!
//! Every setting resolves in the same order: explicit flag, then environment
//! variable, then built-in default.

use stac_trace::cache::DEFAULT_MAX_ENTRIES;
use stac_trace::catalog::{Credentials, DEFAULT_API_URL, DEFAULT_AUTH_URL};

pub const USERNAME_ENV: &str = "UP42_USERNAME";
pub const PASSWORD_ENV: &str = "UP42_PASSWORD";
pub const API_URL_ENV: &str = "STAC_TRACE_API_URL";
pub const AUTH_URL_ENV: &str = "STAC_TRACE_AUTH_URL";
pub const CACHE_ENTRIES_ENV: &str = "STAC_TRACE_CACHE_ENTRIES";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing credentials: set UP42_USERNAME and UP42_PASSWORD")]
    MissingCredentials,

    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

/// Values given on the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub auth_url: Option<String>,
    pub cache_entries: Option<usize>,
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub api_url: String,
    pub auth_url: String,
    pub cache_entries: usize,
}

impl Settings {
    /// Resolve against the process environment.
    pub fn resolve(overrides: &Overrides) -> Result<Self, ConfigError> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve against an arbitrary variable lookup.
    pub fn resolve_with<F>(overrides: &Overrides, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            credentials: resolve_credentials(&lookup)?,
            api_url: resolve_url(overrides.api_url.as_deref(), API_URL_ENV, DEFAULT_API_URL, &lookup),
            auth_url: resolve_url(
                overrides.auth_url.as_deref(),
                AUTH_URL_ENV,
                DEFAULT_AUTH_URL,
                &lookup,
            ),
            cache_entries: resolve_cache_entries(overrides.cache_entries, &lookup)?,
        })
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn resolve_credentials<F>(lookup: &F) -> Result<Credentials, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match (non_empty(lookup, USERNAME_ENV), non_empty(lookup, PASSWORD_ENV)) {
        (Some(username), Some(password)) => Ok(Credentials { username, password }),
        _ => Err(ConfigError::MissingCredentials),
    }
}

fn resolve_url<F>(explicit: Option<&str>, env: &str, default: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let url = match explicit {
        Some(url) => url.to_string(),
        None => non_empty(lookup, env).unwrap_or_else(|| default.to_string()),
    };
    url.trim_end_matches('/').to_string()
}

fn resolve_cache_entries<F>(explicit: Option<usize>, lookup: &F) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(entries) = explicit {
        return Ok(entries.max(1));
    }

    match non_empty(lookup, CACHE_ENTRIES_ENV) {
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::InvalidValue {
                name: CACHE_ENTRIES_ENV,
                value: raw,
            }),
        None => Ok(DEFAULT_MAX_ENTRIES),
    }
}
