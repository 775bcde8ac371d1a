//! End-to-end batch resolution through the public API
//!
//! Uses an in-memory transport that answers by postal code prefix.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cepgeo::cache::CacheManager;
use cepgeo::geocode::{GeocodeFetcher, HttpReply, RetryPolicy, Transport, TransportError};
use cepgeo::output::write_csv;
use futures::future::BoxFuture;
use tempfile::TempDir;

/// "88..." resolves, "99..." is rate limited forever, anything else is 404.
#[derive(Default)]
struct PrefixTransport {
    calls: AtomicUsize,
}

impl Transport for PrefixTransport {
    fn get<'a>(&'a self, cep: &'a str) -> BoxFuture<'a, Result<HttpReply, TransportError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            let reply = if cep.starts_with("88") {
                HttpReply {
                    status: 200,
                    body: format!(r#"{{"cep":"{cep}","cidade":{{"nome":"Florianópolis"}},"estado":{{"sigla":"SC"}}}}"#),
                }
            } else if cep.starts_with("99") {
                HttpReply {
                    status: 429,
                    body: String::new(),
                }
            } else {
                HttpReply {
                    status: 404,
                    body: String::new(),
                }
            };
            Ok(reply)
        })
    }
}

fn fetcher(dir: &TempDir) -> GeocodeFetcher<PrefixTransport> {
    GeocodeFetcher::new(PrefixTransport::default(), CacheManager::with_dir(dir.path()))
        .with_retry(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        })
        .with_request_interval(Duration::from_millis(1))
}

#[tokio::test]
async fn test_mixed_batch_then_warm_rerun() {
    let temp_dir = TempDir::new().unwrap();
    let ceps = ["88010000", "99000000", "12345678", "88015200"];

    let cold = fetcher(&temp_dir);
    let report = cold.resolve_batch(&ceps).await;

    assert_eq!(report.stats.fetched, 2);
    assert_eq!(report.stats.absent, 2);
    // 1 + 3 retries + 1 + 1
    assert_eq!(cold.transport().calls.load(Ordering::SeqCst), 6);

    let warm = fetcher(&temp_dir);
    let rerun = warm.resolve_batch(&ceps).await;

    assert_eq!(rerun.stats.cached, 2);
    assert_eq!(rerun.stats.absent, 2);
    // Failures were never cached, so only they hit the network again.
    assert_eq!(warm.transport().calls.load(Ordering::SeqCst), 4);

    let mut csv = Vec::new();
    write_csv(&mut csv, &rerun.results).unwrap();
    let csv = String::from_utf8(csv).unwrap();
    let statuses: Vec<_> = csv
        .lines()
        .skip(1)
        .map(|l| l.rsplit(',').next().unwrap())
        .collect();
    assert_eq!(statuses, vec!["cached", "absent", "absent", "cached"]);
}

#[tokio::test]
async fn test_resolve_returns_none_for_unknown_code() {
    let temp_dir = TempDir::new().unwrap();
    let fetcher = fetcher(&temp_dir);

    assert!(fetcher.resolve("12345678").await.is_none());
    assert!(!fetcher.cache().contains("12345678"));

    let record = fetcher.resolve("88010000").await.unwrap();
    assert_eq!(record.cep.as_deref(), Some("88010000"));
    assert_eq!(record.state_abbreviation(), Some("SC"));
}
