pub mod aggregate;
pub mod config;

pub use aggregate::Aggregator;
pub use config::{ExportConfig, ExportMode};

use anyhow::{Context, Result};
use extract::{EntityKind, Identifier};
use scrape::{MetricsSnapshot, ScrapeMetrics, Scraper};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use yzapi::{ClientFactory, EntityClient};

/// A product or recipe that could not be fetched and is missing from the export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportFailure {
    pub kind: EntityKind,
    pub id: Identifier,
    pub error: String,
}

#[derive(Debug)]
pub struct ExportOutcome {
    /// Pretty-printed `{ id: entity }` document
    pub json: String,
    pub failures: Vec<ExportFailure>,
    pub metrics: MetricsSnapshot,
}

/// Turn a days export into a products export.
///
/// Every `product_id` / `recipe_id` referenced in `json_text` is fetched through
/// clients from `factory`, at most `config.max_workers` at a time per kind.
/// Products are merged first, then recipes. Fetch errors do not fail the call;
/// they come back in [`ExportOutcome::failures`].
pub async fn export_products_from_input_json<F>(
    json_text: &str,
    factory: &F,
    config: &ExportConfig,
) -> Result<ExportOutcome>
where
    F: ClientFactory,
    F::Client: EntityClient,
{
    config.validate()?;

    let ids = extract::extract_all(json_text);
    info!(
        products = ids.products.len(),
        recipes = ids.recipes.len(),
        "Found entity references"
    );

    let metrics = Arc::new(ScrapeMetrics::new());
    let mut aggregator = Aggregator::new();
    let mut failures = Vec::new();

    for kind in EntityKind::ALL {
        let batch = ids.get(kind);
        if batch.is_empty() {
            debug!(kind = %kind, "Nothing to fetch");
            continue;
        }

        let scraper =
            Scraper::new(batch.to_vec(), config.max_workers).with_metrics(metrics.clone());
        let report = scraper
            .scrape(factory, move |client: Arc<F::Client>, id: Identifier| async move {
                client.fetch(kind, &id).await
            })
            .await
            .with_context(|| format!("Failed to scrape {}s", kind))?;

        info!(
            kind = %kind,
            fetched = report.results.len(),
            failed = report.failures.len(),
            "Scraped batch"
        );

        aggregator.merge(kind, report.results);
        failures.extend(report.failures.into_iter().map(|failure| ExportFailure {
            kind,
            id: failure.id,
            error: failure.error,
        }));
    }

    if aggregator.collisions() > 0 {
        warn!(
            collisions = aggregator.collisions(),
            "Product and recipe identifiers overlap, recipe data replaced product data"
        );
    }

    let json = aggregator.finish()?;

    Ok(ExportOutcome {
        json,
        failures,
        metrics: metrics.snapshot(),
    })
}
