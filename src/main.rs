mod config;
mod error;
mod models;
mod output;
mod pipeline;
mod scrapers;

use anyhow::Context;
use config::ScrapeConfig;
use scrapers::ChromeDriver;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🏠 Listing Scrape - rental listings to a clean dataset");
    info!("=====================================================");

    let config = ScrapeConfig::load()?;
    info!(
        city = %config.search.city,
        working_dir = %config.working_dir.display(),
        schema = %config.schema.version,
        "Configuration loaded"
    );
    tokio::fs::create_dir_all(&config.working_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.working_dir.display()))?;

    if config.stages.replay {
        let config = config.clone();
        tokio::task::spawn_blocking(move || pipeline::replay_snapshots(&config)).await??;
    } else if config.stages.scrape {
        let config = config.clone();
        // headless_chrome is blocking; keep it off the async workers
        tokio::task::spawn_blocking(move || {
            let driver = ChromeDriver::new(config.headless, config.idle_timeout());
            pipeline::run_scrape(&config, &driver)
        })
        .await??;
    }

    if config.stages.aggregate {
        info!("Loading all data files...");
        let rows = pipeline::run_aggregate(&config).context("Aggregation failed")?;
        info!("✅ Consolidated dataset has {} rows", rows);
    }

    Ok(())
}
