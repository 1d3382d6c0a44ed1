//! Board listing harvest: paginated topic-index fetching and normalization.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tracing::{error, info, warn};
use url::Url;

use super::api::{self, ListingTopic};
use super::fetch::{FetchGate, Tier};
use crate::config::Board;
use crate::db::NewTopic;

/// A topic record normalized from a listing page.
#[derive(Debug, Clone)]
pub struct HarvestedTopic {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub category: Option<String>,
    pub reply_count: i64,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub tags: String,
}

impl HarvestedTopic {
    fn from_listing(raw: ListingTopic, origin: &str) -> Self {
        let created_at = api::parse_timestamp(raw.created_at.as_deref());
        // Topics with no replies yet have no last_posted_at.
        let last_activity_at = raw
            .last_posted_at
            .as_deref()
            .map_or(created_at, |s| api::parse_timestamp(Some(s)));

        Self {
            id: raw.id,
            title: raw.title,
            url: topic_url(origin, &raw.slug, raw.id),
            category: Some(
                raw.category_id
                    .map_or_else(|| "Unknown".to_string(), |id| id.to_string()),
            ),
            reply_count: raw.reply_count,
            view_count: raw.view_count,
            created_at,
            last_activity_at,
            tags: raw.tags.join(","),
        }
    }

    /// Listing records carry no author information; that arrives with the
    /// detail crawl.
    #[must_use]
    pub fn to_new_topic(&self) -> NewTopic {
        NewTopic {
            id: self.id,
            title: self.title.clone(),
            url: self.url.clone(),
            category: self.category.clone(),
            author_id: None,
            reply_count: self.reply_count,
            view_count: self.view_count,
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
            tags: self.tags.clone(),
        }
    }
}

/// Canonical topic URL: `<origin>/t/<slug>/<id>`.
#[must_use]
pub fn topic_url(origin: &str, slug: &str, id: i64) -> String {
    format!("{origin}/t/{slug}/{id}")
}

/// Scheme and host of a board URL, used to build topic URLs.
pub fn forum_origin(board_url: &str) -> Result<String> {
    let parsed = Url::parse(board_url).context("Invalid board URL")?;
    let host = parsed.host_str().context("Board URL has no host")?;
    Ok(match parsed.port() {
        Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
        None => format!("{}://{host}", parsed.scheme()),
    })
}

/// JSON listing endpoint for one page of a board.
#[must_use]
pub fn listing_url(board_url: &str, page: u32) -> String {
    let clean = board_url.trim_end_matches('/');
    if page > 1 {
        format!("{clean}.json?page={page}")
    } else {
        format!("{clean}.json")
    }
}

/// Harvest every configured board concurrently.
///
/// Boards run under the board tier and their pages under the page tier.
/// Failed pages and boards are logged and excluded; this function itself
/// never fails.
pub async fn harvest_all_boards(
    gate: &Arc<FetchGate>,
    boards: &[Board],
    scan_pages: u32,
) -> Vec<HarvestedTopic> {
    let tasks = boards.iter().map(|board| {
        let gate = Arc::clone(gate);
        let board = board.clone();
        async move {
            let name = board.name.clone();
            match harvest_board(&gate, &board, scan_pages).await {
                Ok(topics) => topics,
                Err(e) => {
                    error!(board = %name, "Board harvest failed: {e:#}");
                    Vec::new()
                }
            }
        }
    });

    let all_topics: Vec<HarvestedTopic> = join_all(tasks).await.into_iter().flatten().collect();
    info!(total = all_topics.len(), "Harvested topic listings from all boards");
    all_topics
}

/// Harvest all configured pages of one board concurrently.
async fn harvest_board(
    gate: &Arc<FetchGate>,
    board: &Board,
    scan_pages: u32,
) -> Result<Vec<HarvestedTopic>> {
    let _board_permit = gate.acquire(Tier::Board).await?;
    let origin = forum_origin(&board.url)?;
    info!(board = %board.name, pages = scan_pages, "Harvesting board listing");

    let page_tasks = (1..=scan_pages).map(|page| {
        let gate = Arc::clone(gate);
        let origin = origin.clone();
        let board_url = board.url.clone();
        let board_name = board.name.clone();
        async move {
            match harvest_page(&gate, &board_url, &origin, page).await {
                Ok(topics) => topics,
                Err(e) => {
                    warn!(board = %board_name, page, "Listing page failed: {e:#}");
                    Vec::new()
                }
            }
        }
    });

    let topics: Vec<HarvestedTopic> = join_all(page_tasks).await.into_iter().flatten().collect();
    info!(board = %board.name, count = topics.len(), "Board harvest complete");
    Ok(topics)
}

/// Fetch and normalize one listing page under the page tier.
async fn harvest_page(
    gate: &Arc<FetchGate>,
    board_url: &str,
    origin: &str,
    page: u32,
) -> Result<Vec<HarvestedTopic>> {
    let _page_permit = gate.acquire(Tier::ListingPage).await?;
    let url = listing_url(board_url, page);

    let payload = gate.fetch_json(&url).await?;
    let raw: Vec<ListingTopic> =
        api::parse_records(api::array_at(&payload, &["topic_list", "topics"]), "listing topic");

    Ok(raw
        .into_iter()
        .map(|t| HarvestedTopic::from_listing(t, origin))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_listing_url_first_page_has_no_query() {
        assert_eq!(
            listing_url("https://f.example/tag/ai/", 1),
            "https://f.example/tag/ai.json"
        );
    }

    #[test]
    fn test_listing_url_later_pages() {
        assert_eq!(
            listing_url("https://f.example/c/news/34", 3),
            "https://f.example/c/news/34.json?page=3"
        );
    }

    #[test]
    fn test_forum_origin() {
        assert_eq!(
            forum_origin("https://f.example/tag/ai").unwrap(),
            "https://f.example"
        );
        assert_eq!(
            forum_origin("http://localhost:8080/c/dev/4").unwrap(),
            "http://localhost:8080"
        );
        assert!(forum_origin("not a url").is_err());
    }

    #[test]
    fn test_from_listing_normalizes_fields() {
        let raw: ListingTopic = serde_json::from_value(json!({
            "id": 42,
            "title": "Interesting topic",
            "slug": "interesting-topic",
            "category_id": 7,
            "reply_count": 3,
            "views": 150,
            "created_at": "2024-05-01T08:00:00Z",
            "last_posted_at": "2024-05-02T09:30:00Z",
            "tags": ["ai", "llm"]
        }))
        .unwrap();

        let topic = HarvestedTopic::from_listing(raw, "https://f.example");
        assert_eq!(topic.url, "https://f.example/t/interesting-topic/42");
        assert_eq!(topic.category.as_deref(), Some("7"));
        assert_eq!(topic.tags, "ai,llm");
        assert!(topic.last_activity_at > topic.created_at);
    }

    #[test]
    fn test_missing_last_posted_falls_back_to_created() {
        let raw: ListingTopic = serde_json::from_value(json!({
            "id": 42,
            "title": "No replies yet",
            "slug": "no-replies",
            "created_at": "2024-05-01T08:00:00Z"
        }))
        .unwrap();

        let topic = HarvestedTopic::from_listing(raw, "https://f.example");
        assert_eq!(topic.last_activity_at, topic.created_at);
        assert_eq!(topic.category.as_deref(), Some("Unknown"));
    }
}
