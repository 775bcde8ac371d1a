//! Command-line interface parsing for cepgeo
//!
//! Parses arguments with clap (flags can also come from the environment) and
//! validates them into a `FetchConfig` for the batch run.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use thiserror::Error;

use crate::geocode::client::{ClientConfig, CEP_ABERTO_BASE_URL};
use crate::geocode::RetryPolicy;
use crate::output::OutputFormat;

/// Error types for CLI argument validation
#[derive(Debug, Error)]
pub enum CliError {
    /// Neither an input file nor positional codes were given
    #[error("No postal codes given: pass --input <FILE> or list codes as arguments")]
    NoInput,

    /// No API token was configured
    #[error("Missing API token: pass --token or set CEPABERTO_TOKEN")]
    MissingToken,

    /// The retry ceiling must allow at least one request
    #[error("Invalid --max-attempts: {0} (must be at least 1)")]
    InvalidAttempts(u32),
}

/// cepgeo - Geocode CNO postal codes through CEP Aberto with a resumable cache
#[derive(Parser, Debug)]
#[command(name = "cepgeo")]
#[command(about = "Geocode postal codes through the CEP Aberto API with a resumable disk cache")]
#[command(version)]
pub struct Cli {
    /// Postal codes to resolve (added after the ones read from --input)
    #[arg(value_name = "CEP")]
    pub ceps: Vec<String>,

    /// Text file with one postal code per line
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// CEP Aberto API token
    #[arg(long, env = "CEPABERTO_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Lookup endpoint
    #[arg(long, env = "CEPABERTO_URL", default_value = CEP_ABERTO_BASE_URL)]
    pub base_url: String,

    /// Directory holding one cached response per postal code
    #[arg(long, env = "CEPGEO_CACHE_DIR", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Output file (stdout when omitted)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (defaults from the output extension, else csv)
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Skip this many distinct codes before processing
    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Process at most this many distinct codes
    #[arg(long)]
    pub limit: Option<usize>,

    /// Minimum gap between API requests, in milliseconds
    #[arg(long, default_value_t = 1100)]
    pub delay_ms: u64,

    /// Per-request timeout, in seconds
    #[arg(long, default_value_t = 15)]
    pub timeout_secs: u64,

    /// Attempts per postal code before giving up on transient failures
    #[arg(long, default_value_t = 5)]
    pub max_attempts: u32,

    /// Backoff unit in milliseconds; the n-th retry waits unit * 2^(n-1)
    #[arg(long, default_value_t = 1000)]
    pub backoff_ms: u64,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    /// Default log filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Validated settings for one batch run
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub input: Option<PathBuf>,
    pub ceps: Vec<String>,
    pub client: ClientConfig,
    pub cache_dir: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
    pub offset: usize,
    pub limit: Option<usize>,
    pub request_interval: Duration,
    pub retry: RetryPolicy,
}

impl FetchConfig {
    /// Creates a FetchConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(FetchConfig)` with defaults resolved
    /// * `Err(CliError)` if input, token, or retry settings are unusable
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        if cli.input.is_none() && cli.ceps.is_empty() {
            return Err(CliError::NoInput);
        }

        let token = cli
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(CliError::MissingToken)?;

        if cli.max_attempts == 0 {
            return Err(CliError::InvalidAttempts(cli.max_attempts));
        }

        let format = cli
            .format
            .or_else(|| cli.output.as_deref().and_then(OutputFormat::from_path))
            .unwrap_or_default();

        Ok(FetchConfig {
            input: cli.input.clone(),
            ceps: cli.ceps.clone(),
            client: ClientConfig::new(token)
                .with_base_url(cli.base_url.clone())
                .with_timeout(Duration::from_secs(cli.timeout_secs)),
            cache_dir: cli.cache_dir.clone(),
            output: cli.output.clone(),
            format,
            offset: cli.offset,
            limit: cli.limit,
            request_interval: Duration::from_millis(cli.delay_ms),
            retry: RetryPolicy {
                max_attempts: cli.max_attempts,
                base_delay: Duration::from_millis(cli.backoff_ms),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["cepgeo"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_cli_parse_defaults() {
        let cli = parse(&["--token", "abc", "88010000"]);
        assert_eq!(cli.ceps, vec!["88010000".to_string()]);
        assert_eq!(cli.delay_ms, 1100);
        assert_eq!(cli.timeout_secs, 15);
        assert_eq!(cli.max_attempts, 5);
        assert_eq!(cli.backoff_ms, 1000);
        assert_eq!(cli.offset, 0);
        assert!(cli.limit.is_none());
    }

    #[test]
    fn test_from_cli_builds_config() {
        let cli = parse(&[
            "--token", "abc", "--input", "ceps.txt", "--offset", "25000", "--limit", "5000",
            "--delay-ms", "500", "--max-attempts", "3",
        ]);
        let config = FetchConfig::from_cli(&cli).unwrap();

        assert_eq!(config.input, Some(PathBuf::from("ceps.txt")));
        assert_eq!(config.client.token, "abc");
        assert_eq!(config.client.timeout, Duration::from_secs(15));
        assert_eq!(config.offset, 25000);
        assert_eq!(config.limit, Some(5000));
        assert_eq!(config.request_interval, Duration::from_millis(500));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_secs(1));
        assert_eq!(config.format, OutputFormat::Csv);
    }

    #[test]
    fn test_from_cli_requires_input() {
        let cli = parse(&["--token", "abc"]);
        assert!(matches!(FetchConfig::from_cli(&cli), Err(CliError::NoInput)));
    }

    #[test]
    fn test_from_cli_rejects_blank_token() {
        let cli = parse(&["--token", "  ", "88010000"]);
        assert!(matches!(FetchConfig::from_cli(&cli), Err(CliError::MissingToken)));
    }

    #[test]
    fn test_from_cli_rejects_zero_attempts() {
        let cli = parse(&["--token", "abc", "--max-attempts", "0", "88010000"]);
        let err = FetchConfig::from_cli(&cli).unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_format_follows_output_extension() {
        let cli = parse(&["--token", "abc", "-o", "out.jsonl", "88010000"]);
        assert_eq!(FetchConfig::from_cli(&cli).unwrap().format, OutputFormat::Jsonl);

        let cli = parse(&["--token", "abc", "-o", "out.jsonl", "--format", "csv", "88010000"]);
        assert_eq!(FetchConfig::from_cli(&cli).unwrap().format, OutputFormat::Csv);
    }

    #[test]
    fn test_log_filter() {
        assert_eq!(parse(&[]).log_filter(), "info");
        assert_eq!(parse(&["-v"]).log_filter(), "debug");
        assert_eq!(parse(&["-vv"]).log_filter(), "trace");
        assert_eq!(parse(&["-q"]).log_filter(), "warn");
    }
}
