use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use discourse_hotness_crawler::config::Config;
use discourse_hotness_crawler::crawler::Crawler;
use discourse_hotness_crawler::db::{self, Database};
use discourse_hotness_crawler::hotness::HotnessEngine;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting discourse-hotness-crawler");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        boards = config.boards.len(),
        scan_pages = config.scan_pages,
        "Configuration loaded"
    );

    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    let db = Database::new(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    info!("Database initialized");

    // Ctrl-C stops new work; in-flight topics finish or abort at the next
    // cancellation checkpoint.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Shutdown signal received, finishing in-flight work");
                cancel.cancel();
            }
        });
    }

    let crawler = Crawler::new(config.clone(), db.clone(), cancel.clone())
        .context("Failed to build crawler")?;
    let outcome = crawler.run().await.context("Crawl cycle failed")?;

    info!(
        discovered = outcome.discovered,
        scheduled = outcome.scheduled,
        succeeded = outcome.succeeded,
        "Crawl cycle finished"
    );

    if cancel.is_cancelled() {
        warn!("Shutting down before analysis due to cancellation");
        return Ok(());
    }

    let engine = HotnessEngine::new(db.clone(), config.hotness);
    let analysis = engine
        .recompute_recent(config.analysis_window_hours)
        .await
        .context("Hotness analysis failed")?;

    info!(
        analyzed = analysis.analyzed_topics,
        scores_updated = analysis.updated_scores,
        "Hotness analysis finished"
    );

    let stats = engine.stats().await?;
    info!(
        total_topics = stats.total_topics,
        avg_hotness = stats.avg_hotness,
        max_hotness = stats.max_hotness,
        "Hotness statistics"
    );
    for category in &stats.category_stats {
        info!(
            category = %category.category,
            topics = category.topic_count,
            avg_hotness = category.avg_hotness,
            "Category hotness"
        );
    }

    if let Some(days) = config.retention_days {
        let deleted = db::delete_topics_inactive_since(db.pool(), days)
            .await
            .context("Retention cleanup failed")?;
        info!(deleted, days, "Retention cleanup finished");
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,discourse_hotness_crawler=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
