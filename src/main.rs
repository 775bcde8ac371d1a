//! cepgeo - Geocode CNO postal codes through CEP Aberto
//!
//! Reads a list of postal codes, resolves each one through the disk cache or
//! the API, and writes the results as CSV or JSON Lines.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cepgeo::cache::CacheManager;
use cepgeo::cli::{Cli, FetchConfig};
use cepgeo::geocode::{GeocodeFetcher, HttpTransport};
use cepgeo::input::{load_postal_codes, prepare};
use cepgeo::output::write_results;

/// Logs go to stderr so stdout can carry the exported rows.
fn setup_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_tracing(cli.log_filter());

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = FetchConfig::from_cli(cli)?;

    let mut codes = match &config.input {
        Some(path) => load_postal_codes(path)?,
        None => Vec::new(),
    };
    codes.extend(config.ceps.iter().cloned());
    let codes = prepare(codes, config.offset, config.limit);

    let cache = match &config.cache_dir {
        Some(dir) => CacheManager::with_dir(dir.clone()),
        None => CacheManager::new()
            .ok_or("could not determine a cache directory; pass --cache-dir")?,
    };

    let transport = HttpTransport::new(config.client.clone())?;
    let fetcher = GeocodeFetcher::new(transport, cache)
        .with_retry(config.retry)
        .with_request_interval(config.request_interval);

    info!(
        count = codes.len(),
        cache_dir = %fetcher.cache().dir().display(),
        "resolving postal codes"
    );
    let report = fetcher.resolve_batch(&codes).await;

    match &config.output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            write_results(&mut writer, config.format, &report.results)?;
            writer.flush()?;
        }
        None => {
            let mut writer = io::stdout().lock();
            write_results(&mut writer, config.format, &report.results)?;
            writer.flush()?;
        }
    }

    info!(
        total = report.results.len(),
        cached = report.stats.cached,
        fetched = report.stats.fetched,
        absent = report.stats.absent,
        duplicates = report.stats.duplicates,
        "done"
    );
    Ok(())
}
