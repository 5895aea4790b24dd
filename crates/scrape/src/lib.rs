pub mod metrics;

pub use metrics::{MetricsSnapshot, ScrapeMetrics};

use anyhow::{Context, Result};
use dashmap::DashMap;
use extract::Identifier;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::task::JoinSet;
use tracing::{debug, warn};
use yzapi::ClientFactory;

/// An identifier whose fetch failed, with the error that caused it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    pub id: Identifier,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct ScrapeReport {
    /// Identifier -> raw JSON document, successful fetches only
    pub results: HashMap<Identifier, String>,
    /// Failed identifiers, in batch order
    pub failures: Vec<FetchFailure>,
}

impl ScrapeReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fixed-size worker pool fetching one document per identifier.
///
/// Every worker takes its own client from the factory and keeps it until the
/// batch is drained. Identifiers are claimed through a shared cursor, so each
/// one is fetched by exactly one worker, once.
pub struct Scraper {
    tasks: Arc<[Identifier]>,
    max_workers: usize,
    metrics: Arc<ScrapeMetrics>,
}

impl Scraper {
    pub fn new(tasks: Vec<Identifier>, max_workers: usize) -> Self {
        Self {
            tasks: tasks.into(),
            max_workers,
            metrics: Arc::new(ScrapeMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ScrapeMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<ScrapeMetrics> {
        &self.metrics
    }

    /// Number of workers a run will spawn
    pub fn worker_count(&self) -> usize {
        self.max_workers.min(self.tasks.len())
    }

    /// Fetch every identifier and wait for all workers to finish.
    ///
    /// A failed fetch never stops the batch: the identifier is left out of
    /// `results` and recorded in `failures`. Only a bad worker limit, a client
    /// that cannot be built, or a panicking worker fail the whole run.
    pub async fn scrape<F, Fetch, Fut>(&self, factory: &F, fetch: Fetch) -> Result<ScrapeReport>
    where
        F: ClientFactory,
        Fetch: Fn(Arc<F::Client>, Identifier) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        if self.max_workers == 0 {
            anyhow::bail!("Scraper needs at least one worker");
        }
        if self.tasks.is_empty() {
            return Ok(ScrapeReport::default());
        }

        let worker_count = self.worker_count();
        let clients = (0..worker_count)
            .map(|worker| {
                factory
                    .new_client()
                    .with_context(|| format!("Failed to create client for worker {}", worker))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(tasks = self.tasks.len(), workers = worker_count, "Starting scrape");

        let cursor = Arc::new(AtomicUsize::new(0));
        let results = Arc::new(DashMap::with_capacity(self.tasks.len()));
        let failures = Arc::new(DashMap::new());
        let fetch = Arc::new(fetch);

        let mut workers = JoinSet::new();
        for (worker, client) in clients.into_iter().enumerate() {
            let client = Arc::new(client);
            let tasks = self.tasks.clone();
            let cursor = cursor.clone();
            let results = results.clone();
            let failures = failures.clone();
            let fetch = fetch.clone();
            let metrics = self.metrics.clone();

            workers.spawn(async move {
                let mut processed = 0usize;
                loop {
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(id) = tasks.get(index) else {
                        break;
                    };

                    let timer = metrics.record_start();
                    let outcome = fetch(client.clone(), id.clone()).await;
                    timer.finish(outcome.is_ok());

                    match outcome {
                        Ok(document) => {
                            results.insert(id.clone(), document);
                        }
                        Err(e) => {
                            let error = format!("{:#}", e);
                            warn!(worker = worker, id = %id, error = %error, "Fetch failed");
                            failures.insert(
                                index,
                                FetchFailure {
                                    id: id.clone(),
                                    error,
                                },
                            );
                        }
                    }
                    processed += 1;
                }
                debug!(worker = worker, processed = processed, "Worker finished");
            });
        }

        // Drain every worker before reporting, even if one of them panicked
        let mut panicked = None;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Scrape worker did not finish");
                panicked.get_or_insert(e);
            }
        }
        if let Some(e) = panicked {
            return Err(e).context("Scrape worker panicked, batch is incomplete");
        }

        let results = Arc::into_inner(results)
            .context("Scrape results still shared after all workers finished")?;
        let failures = Arc::into_inner(failures)
            .context("Scrape failures still shared after all workers finished")?;

        let mut failures: Vec<(usize, FetchFailure)> = failures.into_iter().collect();
        failures.sort_by_key(|(index, _)| *index);

        let report = ScrapeReport {
            results: results.into_iter().collect(),
            failures: failures.into_iter().map(|(_, failure)| failure).collect(),
        };

        debug!(
            fetched = report.results.len(),
            failed = report.failures.len(),
            "Scrape finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Stub client; each one knows which worker slot built it
    struct StubClient {
        serial: usize,
    }

    #[derive(Default)]
    struct CountingFactory {
        built: AtomicUsize,
    }

    impl ClientFactory for CountingFactory {
        type Client = StubClient;

        fn new_client(&self) -> Result<StubClient> {
            let serial = self.built.fetch_add(1, Ordering::SeqCst);
            Ok(StubClient { serial })
        }
    }

    fn doc(body: &str) -> Result<String> {
        Ok(body.to_string())
    }

    fn ids(n: usize) -> Vec<Identifier> {
        (0..n).map(|i| format!("id-{}", i)).collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_identifier_fetched_once() {
        let factory = CountingFactory::default();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = calls.clone();

        let scraper = Scraper::new(ids(37), 5);
        let report = scraper
            .scrape(&factory, move |_client: Arc<StubClient>, id: Identifier| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(id.clone());
                    doc(&format!(r#"{{"id":"{}"}}"#, id))
                }
            })
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.results.len(), 37);
        for id in ids(37) {
            assert_eq!(report.results[&id], format!(r#"{{"id":"{}"}}"#, id));
        }

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 37);
        assert_eq!(calls.iter().collect::<HashSet<_>>().len(), 37);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_failure_does_not_abort_batch() {
        let factory = CountingFactory::default();
        let scraper = Scraper::new(ids(10), 5);

        let report = scraper
            .scrape(&factory, |_client: Arc<StubClient>, id: Identifier| async move {
                if id == "id-3" {
                    anyhow::bail!("remote said no");
                }
                doc("{}")
            })
            .await
            .unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.results.len(), 9);
        assert!(!report.results.contains_key("id-3"));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, "id-3");
        assert!(report.failures[0].error.contains("remote said no"));
        assert_eq!(scraper.metrics().snapshot().fetches_failed, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failures_reported_in_batch_order() {
        let factory = CountingFactory::default();
        let scraper = Scraper::new(ids(20), 3);

        let report = scraper
            .scrape(&factory, |_client: Arc<StubClient>, id: Identifier| async move {
                Err::<String, _>(anyhow::anyhow!("down: {}", id))
            })
            .await
            .unwrap();

        assert!(report.results.is_empty());
        let failed: Vec<_> = report.failures.iter().map(|f| f.id.clone()).collect();
        assert_eq!(failed, ids(20));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_parallelism_is_bounded() {
        let factory = CountingFactory::default();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (in_flight_c, peak_c) = (in_flight.clone(), peak.clone());

        let scraper = Scraper::new(ids(40), 5);
        let report = scraper
            .scrape(&factory, move |_client: Arc<StubClient>, _id: Identifier| {
                let in_flight = in_flight_c.clone();
                let peak = peak_c.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    doc("{}")
                }
            })
            .await
            .unwrap();

        assert_eq!(report.results.len(), 40);
        assert!(peak.load(Ordering::SeqCst) <= 5);
        assert!(scraper.metrics().peak_in_flight() <= 5);
        assert_eq!(factory.built.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_count_capped_by_batch_size() {
        let factory = CountingFactory::default();
        let used = Arc::new(Mutex::new(HashSet::new()));
        let used_c = used.clone();

        let scraper = Scraper::new(ids(2), 5);
        assert_eq!(scraper.worker_count(), 2);

        scraper
            .scrape(&factory, move |client: Arc<StubClient>, _id: Identifier| {
                let used = used_c.clone();
                async move {
                    used.lock().unwrap().insert(client.serial);
                    doc("{}")
                }
            })
            .await
            .unwrap();

        assert_eq!(factory.built.load(Ordering::SeqCst), 2);
        assert!(used.lock().unwrap().iter().all(|serial| *serial < 2));
    }

    #[tokio::test]
    async fn test_empty_batch_builds_no_clients() {
        let factory = CountingFactory::default();
        let scraper = Scraper::new(Vec::new(), 5);

        let report = scraper
            .scrape(&factory, |_client: Arc<StubClient>, _id: Identifier| async move {
                doc("{}")
            })
            .await
            .unwrap();

        assert!(report.results.is_empty());
        assert!(report.is_complete());
        assert_eq!(factory.built.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let factory = CountingFactory::default();
        let scraper = Scraper::new(ids(3), 0);

        let result = scraper
            .scrape(&factory, |_client: Arc<StubClient>, _id: Identifier| async move {
                doc("{}")
            })
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_factory_error_fails_before_fetching() {
        let factory = || -> Result<StubClient> { anyhow::bail!("no session") };
        let fetched = Arc::new(AtomicUsize::new(0));
        let fetched_c = fetched.clone();

        let result = Scraper::new(ids(3), 2)
            .scrape(&factory, move |_client: Arc<StubClient>, _id: Identifier| {
                let fetched = fetched_c.clone();
                async move {
                    fetched.fetch_add(1, Ordering::SeqCst);
                    doc("{}")
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(fetched.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_worker_fails_run() {
        let factory = CountingFactory::default();
        let metrics = Arc::new(ScrapeMetrics::new());
        let scraper = Scraper::new(ids(6), 2).with_metrics(metrics.clone());

        let result = scraper
            .scrape(&factory, |_client: Arc<StubClient>, id: Identifier| async move {
                if id == "id-1" {
                    panic!("worker blew up");
                }
                doc("{}")
            })
            .await;

        assert!(result.is_err());
        // the panicked fetch must not stay in flight for the next batch sharing these metrics
        assert_eq!(metrics.in_flight(), 0);
        assert!(metrics.snapshot().fetches_failed >= 1);
    }
}
