//! Topic detail crawling: a fixed worker pool draining a preloaded queue.
//!
//! Every scheduled topic URL is pushed into an mpsc channel up front and the
//! sender dropped, so the workers drain it to completion. Each worker holds a
//! detail-tier permit for the whole of one topic, including its pagination.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use super::api::{self, ApiPost, Participant, TopicDetail};
use super::fetch::{FetchGate, Tier};
use super::filter::is_meaningful;
use crate::content::html_to_text;
use crate::db::{self, Database, NewPost, NewTopic, NewUser};

/// Crawls topic detail pages and persists the results.
pub struct DetailCrawler {
    db: Database,
    gate: Arc<FetchGate>,
    workers: usize,
    min_post_length: usize,
}

impl DetailCrawler {
    #[must_use]
    pub fn new(db: Database, gate: Arc<FetchGate>, workers: usize, min_post_length: usize) -> Self {
        Self {
            db,
            gate,
            workers,
            min_post_length,
        }
    }

    /// Crawl every URL with a fixed pool of workers.
    ///
    /// Returns `(succeeded, total)`. Individual topic failures are logged
    /// and counted, never propagated.
    pub async fn crawl_all(&self, urls: Vec<String>) -> (usize, usize) {
        let total = urls.len();
        if total == 0 {
            return (0, 0);
        }

        let (tx, rx) = mpsc::channel(total);
        for url in urls {
            // Capacity equals queue length, so this never blocks.
            if tx.send(url).await.is_err() {
                break;
            }
        }
        drop(tx);
        let rx = Arc::new(Mutex::new(rx));

        let workers = self.workers.min(total).max(1);
        info!(total, workers, "Starting detail crawl");

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let rx = Arc::clone(&rx);
            let db = self.db.clone();
            let gate = Arc::clone(&self.gate);
            let min_post_length = self.min_post_length;
            handles.push(tokio::spawn(async move {
                let mut succeeded = 0usize;
                loop {
                    if gate.cancel_token().is_cancelled() {
                        debug!(worker_id, "Worker stopping on cancellation");
                        break;
                    }
                    let url = { rx.lock().await.recv().await };
                    let Some(url) = url else { break };

                    match crawl_topic(&db, &gate, &url, min_post_length).await {
                        Ok(()) => succeeded += 1,
                        Err(e) => error!(url, "Topic crawl failed: {e:#}"),
                    }
                }
                succeeded
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await {
                Ok(count) => succeeded += count,
                Err(e) => error!("Detail worker panicked: {e}"),
            }
        }

        info!(succeeded, total, "Detail crawl complete");
        (succeeded, total)
    }
}

/// Crawl one topic: all of its pages, then persist users, topic, and posts.
async fn crawl_topic(
    db: &Database,
    gate: &Arc<FetchGate>,
    url: &str,
    min_post_length: usize,
) -> Result<()> {
    let _permit = gate.acquire(Tier::TopicDetail).await?;

    let first = gate
        .fetch_json(&format!("{url}.json"))
        .await
        .with_context(|| format!("First detail page failed: {url}"))?;

    let detail: TopicDetail =
        serde_json::from_value(first.clone()).context("Malformed topic detail")?;
    let participants: Vec<Participant> = api::parse_records(
        api::array_at(&first, &["details", "participants"]),
        "participant",
    );

    let mut posts: Vec<ApiPost> =
        api::parse_records(api::array_at(&first, &["post_stream", "posts"]), "post");
    let page_size = posts.len();

    // Later pages reuse the first page's size; a failed page loses only
    // its own posts.
    if page_size > 0 && detail.posts_count > page_size as i64 {
        let pages = (detail.posts_count as usize).div_ceil(page_size);
        for page in 2..=pages {
            if gate.cancel_token().is_cancelled() {
                break;
            }
            match gate.fetch_json(&format!("{url}.json?page={page}")).await {
                Ok(payload) => posts.extend(api::parse_records::<ApiPost>(
                    api::array_at(&payload, &["post_stream", "posts"]),
                    "post",
                )),
                Err(e) => warn!(url, page, "Detail page failed, skipping: {e:#}"),
            }
        }
    }

    persist_topic(db, &detail, url, &participants, &posts, min_post_length).await
}

async fn persist_topic(
    db: &Database,
    detail: &TopicDetail,
    url: &str,
    participants: &[Participant],
    posts: &[ApiPost],
    min_post_length: usize,
) -> Result<()> {
    let users = collect_users(participants, posts);
    db::upsert_users(db.pool(), &users).await?;

    let created_at = api::parse_timestamp(detail.created_at.as_deref());
    let last_activity_at = detail
        .last_posted_at
        .as_deref()
        .map_or(created_at, |s| api::parse_timestamp(Some(s)));
    // An author with no username never makes it into the users batch, so
    // the topic must not reference them either.
    let author_id = posts
        .iter()
        .find(|p| p.post_number == 1)
        .filter(|p| p.username.is_some())
        .and_then(|p| p.user_id);

    let topic = NewTopic {
        id: detail.id,
        title: detail.title.clone(),
        url: url.to_string(),
        category: Some(
            detail
                .category_id
                .map_or_else(|| "Unknown".to_string(), |id| id.to_string()),
        ),
        author_id,
        reply_count: detail.reply_count,
        view_count: detail.view_count,
        created_at,
        last_activity_at,
        tags: detail.tags.join(","),
    };
    db::upsert_topic(db.pool(), &topic).await?;

    let kept = build_posts(detail.id, posts, min_post_length);
    let filtered = posts.len() - kept.len();
    db::upsert_posts(db.pool(), &kept).await?;

    info!(
        topic_id = detail.id,
        posts = kept.len(),
        filtered,
        users = users.len(),
        "Stored topic detail"
    );
    Ok(())
}

/// Union of participants and post authors, deduplicated by user id.
fn collect_users(participants: &[Participant], posts: &[ApiPost]) -> Vec<NewUser> {
    let mut by_id: HashMap<i64, NewUser> = HashMap::new();

    for p in participants {
        by_id.insert(
            p.id,
            NewUser {
                id: p.id,
                username: p.username.clone(),
                avatar_url: api::expand_avatar(p.avatar_template.as_deref()),
            },
        );
    }

    for post in posts {
        let (Some(id), Some(username)) = (post.user_id, post.username.as_deref()) else {
            continue;
        };
        by_id.entry(id).or_insert_with(|| NewUser {
            id,
            username: username.to_string(),
            avatar_url: api::expand_avatar(post.avatar_template.as_deref()),
        });
    }

    let mut users: Vec<NewUser> = by_id.into_values().collect();
    users.sort_unstable_by_key(|u| u.id);
    users
}

/// Convert the API posts to storable rows, dropping unsubstantive content.
fn build_posts(topic_id: i64, posts: &[ApiPost], min_post_length: usize) -> Vec<NewPost> {
    posts
        .iter()
        .filter_map(|post| {
            let content = html_to_text(&post.cooked);
            if !is_meaningful(&content, min_post_length) {
                debug!(post_id = post.id, "Filtered post");
                return None;
            }
            Some(NewPost {
                id: post.id,
                topic_id,
                // Authors without a username have no users row to reference.
                user_id: post.username.as_ref().and(post.user_id),
                post_number: post.post_number,
                reply_to_post_number: post.reply_to_post_number,
                content,
                like_count: post.like_count(),
                created_at: api::parse_timestamp(post.created_at.as_deref()),
            })
        })
        .collect()
}
