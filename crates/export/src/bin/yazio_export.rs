use anyhow::{Context, Result};
use clap::Parser;
use export::{ExportConfig, ExportMode, export_products_from_input_json};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use yzapi::HttpClientFactory;

/// Embed every product and recipe referenced by a days export into one JSON file
#[derive(Debug, Parser)]
#[command(name = "yazio-export", version)]
struct Args {
    /// File holding the bearer token written by the login step
    #[arg(long)]
    token: PathBuf,

    /// Days export to scan for product_id / recipe_id references
    #[arg(long)]
    from: PathBuf,

    /// Where to write the products export
    #[arg(short, long)]
    out: PathBuf,

    /// JSON config file; missing fields fall back to defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Timeout and retry preset, used when no config file is given
    #[arg(long, value_enum, default_value_t = ExportMode::Balanced, conflicts_with = "config")]
    mode: ExportMode,

    /// Concurrent fetches per entity kind
    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ExportConfig::from_file(path)?,
        None => ExportConfig::for_mode(args.mode),
    };
    if let Some(workers) = args.workers {
        config.max_workers = workers;
    }
    if let Some(base_url) = args.base_url {
        config.api.base_url = base_url;
    }
    config.validate()?;

    let input = tokio::fs::read_to_string(&args.from)
        .await
        .with_context(|| format!("Failed to read days export: {:?}", args.from))?;

    let factory = HttpClientFactory::from_token_file(&args.token, config.api_settings())?;

    let outcome = export_products_from_input_json(&input, &factory, &config).await?;

    tokio::fs::write(&args.out, &outcome.json)
        .await
        .with_context(|| format!("Failed to write products export: {:?}", args.out))?;

    tracing::info!(
        out = ?args.out,
        fetched = outcome.metrics.fetches_succeeded,
        failed = outcome.failures.len(),
        avg_fetch_ms = outcome.metrics.avg_fetch_time_ms,
        "Export written"
    );

    for failure in &outcome.failures {
        tracing::warn!(
            kind = %failure.kind,
            id = %failure.id,
            error = %failure.error,
            "Missing from export"
        );
    }

    Ok(())
}
