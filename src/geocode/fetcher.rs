//! Cache-backed geocode fetcher
//!
//! Resolves postal codes by checking the disk cache first and only then
//! calling the API. Transient failures (429, 5xx gateway errors, timeouts,
//! refused connections) are retried with exponential backoff; anything else
//! degrades to an absent result that leaves the cache untouched, so the next
//! run tries again.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

use super::client::Transport;
use super::GeocodeRecord;
use crate::cache::CacheManager;

/// Statuses worth retrying
const TRANSIENT_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Default gap between requests that reach the network (~3 requests/second upstream limit)
pub const DEFAULT_REQUEST_INTERVAL: Duration = Duration::from_millis(1100);

/// How many distinct codes between progress log lines
const PROGRESS_EVERY: usize = 100;

/// Retry ceiling and backoff unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per postal code, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each further failure
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait after the failed attempt number `attempt` (zero-based): `base * 2^attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Why a lookup produced no record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsentReason {
    /// The API answered with a non-retryable status
    Rejected(u16),
    /// Every attempt hit a transient failure
    Exhausted { attempts: u32 },
    /// The API answered 200 with a body that is not a geocoding object
    Unparsable,
}

/// Outcome of resolving one postal code
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Served from the disk cache, no request made
    Cached(GeocodeRecord),
    /// Fetched from the API and written to the cache
    Fetched(GeocodeRecord),
    /// Nothing usable; no cache entry was written
    Absent(AbsentReason),
}

impl Lookup {
    pub fn record(&self) -> Option<&GeocodeRecord> {
        match self {
            Lookup::Cached(record) | Lookup::Fetched(record) => Some(record),
            Lookup::Absent(_) => None,
        }
    }

    pub fn into_record(self) -> Option<GeocodeRecord> {
        match self {
            Lookup::Cached(record) | Lookup::Fetched(record) => Some(record),
            Lookup::Absent(_) => None,
        }
    }

    /// Short label used in output files and logs
    pub fn label(&self) -> &'static str {
        match self {
            Lookup::Cached(_) => "cached",
            Lookup::Fetched(_) => "fetched",
            Lookup::Absent(_) => "absent",
        }
    }
}

/// A postal code paired with its lookup outcome
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub cep: String,
    pub lookup: Lookup,
}

impl Resolved {
    pub fn record(&self) -> Option<&GeocodeRecord> {
        self.lookup.record()
    }

    pub fn into_pair(self) -> (String, Option<GeocodeRecord>) {
        (self.cep, self.lookup.into_record())
    }
}

/// Counters collected over a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub cached: usize,
    pub fetched: usize,
    pub absent: usize,
    /// Input positions that repeated an earlier postal code
    pub duplicates: usize,
}

impl BatchStats {
    fn record(&mut self, lookup: &Lookup) {
        match lookup {
            Lookup::Cached(_) => self.cached += 1,
            Lookup::Fetched(_) => self.fetched += 1,
            Lookup::Absent(_) => self.absent += 1,
        }
    }
}

/// Result of a batch: one entry per input position, in input order
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub results: Vec<Resolved>,
    pub stats: BatchStats,
}

impl BatchReport {
    /// `(postal code, record or None)` pairs in input order
    pub fn into_pairs(self) -> Vec<(String, Option<GeocodeRecord>)> {
        self.results.into_iter().map(Resolved::into_pair).collect()
    }
}

/// Resolves postal codes through the cache and a [`Transport`]
#[derive(Debug)]
pub struct GeocodeFetcher<T> {
    transport: T,
    cache: CacheManager,
    retry: RetryPolicy,
    request_interval: Duration,
}

impl<T: Transport> GeocodeFetcher<T> {
    /// Creates a fetcher with the default retry policy and request interval
    pub fn new(transport: T, cache: CacheManager) -> Self {
        Self {
            transport,
            cache,
            retry: RetryPolicy::default(),
            request_interval: DEFAULT_REQUEST_INTERVAL,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the minimum gap between consecutive network lookups in a batch
    pub fn with_request_interval(mut self, interval: Duration) -> Self {
        self.request_interval = interval;
        self
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resolves one postal code, returning `None` when no record is available
    pub async fn resolve(&self, cep: &str) -> Option<GeocodeRecord> {
        self.lookup(cep).await.into_record()
    }

    /// Resolves one postal code, reporting where the answer came from
    pub async fn lookup(&self, cep: &str) -> Lookup {
        match self.cached(cep) {
            Some(hit) => hit,
            None => self.fetch(cep).await,
        }
    }

    /// Cache side of a lookup; `None` means the network must be asked
    fn cached(&self, cep: &str) -> Option<Lookup> {
        let record = self.cache.read(cep)?;
        debug!(cep, "cache hit");
        Some(Lookup::Cached(record))
    }

    /// Resolves a batch sequentially
    ///
    /// Each distinct postal code is dispatched once; repeated codes reuse the
    /// first result. Consecutive network lookups are spaced by the request
    /// interval, cache hits are not delayed.
    ///
    /// # Arguments
    /// * `ceps` - Postal codes in the order they should be reported
    ///
    /// # Returns
    /// A `BatchReport` with exactly one `Resolved` per input position, in
    /// input order. Failed lookups are `Lookup::Absent`, never omitted.
    pub async fn resolve_batch<S: AsRef<str>>(&self, ceps: &[S]) -> BatchReport {
        let mut report = BatchReport {
            results: Vec::with_capacity(ceps.len()),
            stats: BatchStats::default(),
        };
        let mut first_seen: HashMap<&str, usize> = HashMap::new();
        let mut last_request: Option<Instant> = None;
        let mut distinct = 0usize;

        for cep in ceps {
            let cep = cep.as_ref();

            if let Some(&index) = first_seen.get(cep) {
                let repeat = report.results[index].clone();
                report.results.push(repeat);
                report.stats.duplicates += 1;
                continue;
            }

            let lookup = match self.cached(cep) {
                Some(hit) => hit,
                None => {
                    if let Some(at) = last_request {
                        sleep_until(at + self.request_interval).await;
                    }
                    let lookup = self.fetch(cep).await;
                    last_request = Some(Instant::now());
                    lookup
                }
            };

            report.stats.record(&lookup);
            first_seen.insert(cep, report.results.len());
            report.results.push(Resolved {
                cep: cep.to_string(),
                lookup,
            });

            distinct += 1;
            if distinct % PROGRESS_EVERY == 0 {
                info!(
                    done = report.results.len(),
                    total = ceps.len(),
                    cached = report.stats.cached,
                    fetched = report.stats.fetched,
                    absent = report.stats.absent,
                    "progress"
                );
            }
        }

        report
    }

    /// Network path with bounded retry
    async fn fetch(&self, cep: &str) -> Lookup {
        let attempts = self.retry.max_attempts.max(1);

        for attempt in 0..attempts {
            match self.transport.get(cep).await {
                Ok(reply) if reply.status == 200 => return self.accept(cep, &reply.body),
                Ok(reply) if TRANSIENT_STATUSES.contains(&reply.status) => {
                    warn!(cep, status = reply.status, attempt = attempt + 1, "transient HTTP status");
                }
                Ok(reply) => {
                    debug!(cep, status = reply.status, "lookup rejected");
                    return Lookup::Absent(AbsentReason::Rejected(reply.status));
                }
                Err(e) => {
                    warn!(cep, error = %e, attempt = attempt + 1, "transport failure");
                }
            }

            if attempt + 1 < attempts {
                sleep(self.retry.delay_for(attempt)).await;
            }
        }

        warn!(cep, attempts, "giving up after retries");
        Lookup::Absent(AbsentReason::Exhausted { attempts })
    }

    fn accept(&self, cep: &str, body: &str) -> Lookup {
        let record = match GeocodeRecord::from_body(body) {
            Ok(record) => record,
            Err(e) => {
                warn!(cep, error = %e, "unparsable response body");
                return Lookup::Absent(AbsentReason::Unparsable);
            }
        };

        if let Err(e) = self.cache.write(cep, body) {
            warn!(cep, path = %self.cache.path_for(cep).display(), error = %e, "cache write failed, continuing uncached");
        }
        debug!(cep, "fetched");
        Lookup::Fetched(record)
    }
}
