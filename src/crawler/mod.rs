//! Incremental forum crawl pipeline.
//!
//! A crawl cycle runs in three stages: harvest the configured board
//! listings, compare against stored state to pick the topics with new
//! activity, then crawl those topics' detail pages with a bounded worker
//! pool. Listing-level counters are refreshed for every harvested topic
//! regardless of whether its details are re-crawled.

pub mod api;
pub mod change;
pub mod detail;
pub mod fetch;
pub mod filter;
pub mod listing;

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::db::{self, Database};
use detail::DetailCrawler;
use fetch::FetchGate;

/// Counters from one crawl cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlOutcome {
    /// Topics seen across all board listings.
    pub discovered: usize,
    /// Topics selected for a detail crawl.
    pub scheduled: usize,
    /// Detail crawls that completed and persisted.
    pub succeeded: usize,
}

/// Drives one full crawl cycle.
pub struct Crawler {
    config: Config,
    db: Database,
    gate: Arc<FetchGate>,
}

impl Crawler {
    /// Build a crawler from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: Config, db: Database, cancel: CancellationToken) -> Result<Self> {
        let gate = Arc::new(FetchGate::new(&config, cancel)?);
        Ok(Self { config, db, gate })
    }

    /// Run one crawl cycle: harvest, detect changes, crawl details.
    ///
    /// # Errors
    ///
    /// Returns an error only when stored state cannot be read; fetch and
    /// persistence failures of individual units are logged and absorbed.
    pub async fn run(&self) -> Result<CrawlOutcome> {
        let harvested =
            listing::harvest_all_boards(&self.gate, &self.config.boards, self.config.scan_pages)
                .await;
        if harvested.is_empty() {
            info!("No topics harvested, nothing to do");
            return Ok(CrawlOutcome::default());
        }

        let ids: Vec<i64> = harvested.iter().map(|t| t.id).collect();
        let stored = db::last_activity_by_ids(self.db.pool(), &ids).await?;
        let scheduled = change::plan_detail_crawl(&harvested, &stored);

        // Listing counters (views, replies) refresh even for topics whose
        // details are skipped; last_activity_at is monotonic in the upsert.
        let refresh: Vec<_> = harvested.iter().map(listing::HarvestedTopic::to_new_topic).collect();
        if let Err(e) = db::upsert_topics(self.db.pool(), &refresh).await {
            error!("Listing refresh failed: {e:#}");
        }

        info!(
            discovered = harvested.len(),
            scheduled = scheduled.len(),
            "Change detection complete"
        );

        let detail_crawler = DetailCrawler::new(
            self.db.clone(),
            Arc::clone(&self.gate),
            self.config.max_concurrent_details,
            self.config.min_post_length,
        );
        let scheduled_count = scheduled.len();
        let (succeeded, _) = detail_crawler.crawl_all(scheduled).await;

        Ok(CrawlOutcome {
            discovered: harvested.len(),
            scheduled: scheduled_count,
            succeeded,
        })
    }
}
