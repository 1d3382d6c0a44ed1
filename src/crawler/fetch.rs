//! Concurrency-gated HTTP fetching with retries.
//!
//! Three independent semaphore tiers bound concurrency: boards are coarse
//! units, listing pages are cheap and numerous, topic-detail pages are
//! expensive and rate-limit-sensitive. Every fetch retries transient
//! failures with exponential backoff plus jitter, and a politeness delay
//! follows each success to stay under anti-automation thresholds.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::constants::CRAWLER_USER_AGENT;

/// Which concurrency ceiling a caller operates under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Board,
    ListingPage,
    TopicDetail,
}

/// Retry behavior for a single fetch unit.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`
    /// plus up to one second of jitter.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..1000));
        exponential + jitter
    }
}

/// Gated HTTP client shared by all crawl stages.
pub struct FetchGate {
    client: reqwest::Client,
    boards: Arc<Semaphore>,
    pages: Arc<Semaphore>,
    details: Arc<Semaphore>,
    retry: RetryPolicy,
    success_delay: (Duration, Duration),
    cancel: CancellationToken,
}

impl FetchGate {
    /// Build a gate from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &Config, cancel: CancellationToken) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .user_agent(CRAWLER_USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            boards: Arc::new(Semaphore::new(config.max_concurrent_boards)),
            pages: Arc::new(Semaphore::new(config.max_concurrent_pages)),
            details: Arc::new(Semaphore::new(config.max_concurrent_details)),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                base_delay: config.retry_base_delay,
            },
            success_delay: (config.success_delay_min, config.success_delay_max),
            cancel,
        })
    }

    /// Acquire a permit for the given tier, waiting until one is free.
    ///
    /// Callers that fetch several pages for one logical unit (a topic's
    /// pagination) hold the permit across all of them.
    pub async fn acquire(&self, tier: Tier) -> Result<OwnedSemaphorePermit> {
        let semaphore = match tier {
            Tier::Board => &self.boards,
            Tier::ListingPage => &self.pages,
            Tier::TopicDetail => &self.details,
        };
        Arc::clone(semaphore)
            .acquire_owned()
            .await
            .context("Concurrency gate closed")
    }

    /// Fetch a URL and decode its body as JSON, retrying transient failures.
    ///
    /// A failure is a transport error, a non-2xx status, or a body that is
    /// not valid JSON. After exhausting retries the error is returned for
    /// this unit alone; callers decide whether to skip or abort.
    ///
    /// # Errors
    ///
    /// Returns an error after the final failed attempt, or when cancelled
    /// during a backoff sleep.
    pub async fn fetch_json(&self, url: &str) -> Result<serde_json::Value> {
        let attempts = self.retry.max_retries + 1;

        for attempt in 0..attempts {
            match self.try_fetch(url).await {
                Ok(value) => {
                    self.politeness_delay().await;
                    return Ok(value);
                }
                Err(e) => {
                    warn!(url, attempt = attempt + 1, attempts, "Fetch failed: {e:#}");
                }
            }

            if attempt + 1 < attempts {
                let delay = self.retry.backoff_delay(attempt);
                debug!(url, ?delay, "Backing off before retry");
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = self.cancel.cancelled() => {
                        anyhow::bail!("Fetch cancelled during backoff: {url}");
                    }
                }
            }
        }

        anyhow::bail!("Fetch failed after {attempts} attempts: {url}")
    }

    async fn try_fetch(&self, url: &str) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Unexpected status {status}");
        }

        response.json().await.context("Invalid JSON body")
    }

    /// Random delay after a successful fetch.
    async fn politeness_delay(&self) {
        let (min, max) = self.success_delay;
        if max.is_zero() {
            return;
        }
        let delay = if min >= max {
            min
        } else {
            let range = (max - min).as_millis() as u64;
            min + Duration::from_millis(rand::thread_rng().gen_range(0..=range))
        };
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = self.cancel.cancelled() => {}
        }
    }

    /// Cancellation token shared with the crawl stages.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
