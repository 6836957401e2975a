//! stac-trace: find out what the satellites are watching.

use std::sync::Arc;

use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use stac_trace::cache::{BoundedCache, DEFAULT_TTL};
use stac_trace::catalog::StacClient;
use stac_trace::geocode::NominatimGeocoder;
use stac_trace::infrastructure::{InfrastructureLookup, OverpassClient};
use stac_trace::planner::DEFAULT_MAX_WORKERS;
use stac_trace::progress;
use stac_trace::types::BoundingBox;

use stac_trace_cli::commands::{self, HotspotOptions, Lookups, SearchOptions, WatchOptions};
use stac_trace_cli::config::{Overrides, Settings};
use stac_trace_cli::output::{self, OutputFormat};

#[derive(Parser)]
#[command(
    name = "stac-trace",
    about = "Explore STAC catalogues to discover what is being watched",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Catalog API base URL. Also reads STAC_TRACE_API_URL.
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Authentication base URL. Also reads STAC_TRACE_AUTH_URL.
    #[arg(long, global = true)]
    auth_url: Option<String>,

    /// Entries per lookup cache. Also reads STAC_TRACE_CACHE_ENTRIES.
    #[arg(long, global = true)]
    cache_entries: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog collections (default: taskable high-resolution only).
    Collections {
        /// Show every collection.
        #[arg(long)]
        all: bool,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Search for recent imagery (one page).
    Search {
        /// Host to search (e.g. oneatlas, capella).
        #[arg(long, default_value = "oneatlas")]
        host: String,

        /// Bounding box: min_lon,min_lat,max_lon,max_lat.
        #[arg(long, allow_hyphen_values = true)]
        bbox: Option<String>,

        /// Days to look back.
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..))]
        days: u32,

        /// Restrict to one collection.
        #[arg(long)]
        collection: Option<String>,

        /// Maximum cloud cover percentage.
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        cloud: Option<u8>,

        /// Maximum number of results (capped at 500).
        #[arg(long, default_value_t = 100)]
        limit: usize,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Find locations with concentrated recent imaging activity.
    Hotspots {
        /// Host to analyze.
        #[arg(long, default_value = "oneatlas")]
        host: String,

        /// Days to analyze.
        #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u32).range(1..))]
        days: u32,

        /// Bounding box: min_lon,min_lat,max_lon,max_lat.
        #[arg(long, allow_hyphen_values = true)]
        bbox: Option<String>,

        /// Query nearby infrastructure for each hotspot.
        #[arg(long)]
        infra: bool,

        /// Smallest window the search will shrink to, in hours.
        #[arg(long, default_value_t = 1)]
        min_chunk_hours: u32,

        /// Concurrent windows for very long ranges.
        #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
        workers: usize,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Show what has been imaging a specific location.
    Watch {
        /// Latitude.
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude.
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Host to search.
        #[arg(long, default_value = "oneatlas")]
        host: String,

        /// Search radius in degrees.
        #[arg(long, default_value_t = 0.1)]
        radius: f64,

        /// Days to look back.
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..))]
        days: u32,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   stac-trace completions bash > ~/.local/share/bash-completion/completions/stac-trace
    ///   stac-trace completions zsh > ~/.zfunc/_stac-trace
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn parse_bbox(text: Option<&str>) -> anyhow::Result<Option<BoundingBox>> {
    Ok(text.map(BoundingBox::parse).transpose()?)
}

/// Resolve settings and authenticate.
async fn connect(overrides: &Overrides) -> anyhow::Result<(Settings, StacClient)> {
    let settings = Settings::resolve(overrides)?;
    let client =
        StacClient::connect(&settings.api_url, &settings.auth_url, &settings.credentials).await?;
    tracing::info!("Authenticated against {}", settings.auth_url);
    Ok((settings, client))
}

fn build_geocoder(settings: &Settings) -> NominatimGeocoder {
    NominatimGeocoder::new(Arc::new(BoundedCache::new(
        settings.cache_entries,
        DEFAULT_TTL,
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let overrides = Overrides {
        api_url: cli.api_url.clone(),
        auth_url: cli.auth_url.clone(),
        cache_entries: cli.cache_entries,
    };
    let now = Utc::now();

    let rendered = match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "stac-trace", &mut std::io::stdout());
            return Ok(());
        }

        Commands::Collections { all, format } => {
            let (_, client) = connect(&overrides).await?;
            let collections = commands::collections(&client, all).await?;
            output::render_collections(&collections, all, format)?
        }

        Commands::Search {
            host,
            bbox,
            days,
            collection,
            cloud,
            limit,
            format,
        } => {
            let options = SearchOptions {
                host,
                bbox: parse_bbox(bbox.as_deref())?,
                days,
                collection,
                cloud,
                limit,
            };
            let (_, client) = connect(&overrides).await?;
            let results = commands::search(&client, &options, now).await?;
            output::render_items(&results.items, format)?
        }

        Commands::Hotspots {
            host,
            days,
            bbox,
            infra,
            min_chunk_hours,
            workers,
            format,
        } => {
            let options = HotspotOptions {
                host,
                days,
                bbox: parse_bbox(bbox.as_deref())?,
                infra,
                min_chunk_hours,
                workers,
            };
            let (settings, client) = connect(&overrides).await?;
            let geocoder = build_geocoder(&settings);

            let overpass = options.infra.then(|| {
                OverpassClient::new(Arc::new(BoundedCache::new(
                    settings.cache_entries,
                    DEFAULT_TTL,
                )))
            });
            let lookups = Lookups {
                geocoder: &geocoder,
                infrastructure: overpass.as_ref().map(|o| o as &dyn InfrastructureLookup),
            };

            let (tx, rx) = progress::channel();
            let logger = commands::log_progress(rx);
            let summary = commands::hotspots(&client, &options, now, lookups, Some(tx)).await?;
            let _ = logger.await;
            output::render_hotspots(&summary, format)?
        }

        Commands::Watch {
            lat,
            lon,
            host,
            radius,
            days,
            format,
        } => {
            let options = WatchOptions {
                lat,
                lon,
                host,
                radius,
                days,
            };
            let (settings, client) = connect(&overrides).await?;
            let report = commands::watch(&client, &options, now, &build_geocoder(&settings)).await?;
            output::render_watch(&report, format)?
        }
    };

    print!("{rendered}");
    Ok(())
}
