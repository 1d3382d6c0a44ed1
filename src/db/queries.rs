use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use super::models::{
    CategoryHotness, HotnessStats, NewPost, NewTopic, NewUser, Post, Topic, TopicWithReplies,
};
use super::sanitize::{sanitize_post, sanitize_topic, sanitize_user};
use super::{format_timestamp, parse_stored_timestamp};
use crate::hotness::HotnessWeights;

// ========== Users ==========

/// Insert or update a batch of users in one transaction.
///
/// `first_seen_at` is written on insert only and never overwritten;
/// username and avatar refresh on every sighting.
pub async fn upsert_users(pool: &SqlitePool, users: &[NewUser]) -> Result<()> {
    if users.is_empty() {
        return Ok(());
    }

    let now = format_timestamp(Utc::now());
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    for user in users {
        let user = sanitize_user(user.clone());
        sqlx::query(
            r"
            INSERT INTO users (id, username, avatar_url, first_seen_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                avatar_url = COALESCE(excluded.avatar_url, users.avatar_url)
            ",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.avatar_url)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to upsert user {}", user.id))?;
    }

    tx.commit().await.context("Failed to commit user batch")?;
    debug!(count = users.len(), "Upserted user batch");
    Ok(())
}

/// Fetch a user by id.
pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<Option<super::models::User>> {
    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch user")
}

// ========== Topics ==========

const TOPIC_UPSERT_SQL: &str = r"
    INSERT INTO topics (
        id, title, url, category, author_id, reply_count, view_count,
        created_at, last_activity_at, tags, crawled_at
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET
        title = excluded.title,
        url = excluded.url,
        category = excluded.category,
        author_id = COALESCE(excluded.author_id, topics.author_id),
        reply_count = excluded.reply_count,
        view_count = excluded.view_count,
        last_activity_at = MAX(topics.last_activity_at, excluded.last_activity_at),
        tags = excluded.tags,
        crawled_at = excluded.crawled_at
";

async fn bind_topic_upsert(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    topic: &NewTopic,
    crawled_at: &str,
) -> Result<()> {
    sqlx::query(TOPIC_UPSERT_SQL)
        .bind(topic.id)
        .bind(&topic.title)
        .bind(&topic.url)
        .bind(&topic.category)
        .bind(topic.author_id)
        .bind(topic.reply_count)
        .bind(topic.view_count)
        .bind(format_timestamp(topic.created_at))
        .bind(format_timestamp(topic.last_activity_at))
        .bind(&topic.tags)
        .bind(crawled_at)
        .execute(&mut **tx)
        .await
        .with_context(|| format!("Failed to upsert topic {}", topic.id))?;
    Ok(())
}

/// Insert or update one topic. `created_at` never changes after insert,
/// and `last_activity_at` can only move forward.
pub async fn upsert_topic(pool: &SqlitePool, topic: &NewTopic) -> Result<()> {
    let topic = sanitize_topic(topic.clone());
    let now = format_timestamp(Utc::now());

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    bind_topic_upsert(&mut tx, &topic, &now).await?;
    tx.commit().await.context("Failed to commit topic upsert")?;
    Ok(())
}

/// Insert or update a batch of topics in one transaction.
pub async fn upsert_topics(pool: &SqlitePool, topics: &[NewTopic]) -> Result<()> {
    if topics.is_empty() {
        return Ok(());
    }

    let now = format_timestamp(Utc::now());
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    for topic in topics {
        let topic = sanitize_topic(topic.clone());
        bind_topic_upsert(&mut tx, &topic, &now).await?;
    }

    tx.commit().await.context("Failed to commit topic batch")?;
    info!(count = topics.len(), "Upserted topic batch");
    Ok(())
}

/// Fetch a topic by id.
pub async fn get_topic(pool: &SqlitePool, id: i64) -> Result<Option<Topic>> {
    sqlx::query_as("SELECT * FROM topics WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch topic")
}

/// Batched lookup of last-activity timestamps for the given topic ids.
///
/// Ids not present in storage are absent from the returned map. Rows whose
/// stored timestamp fails to parse are skipped with a warning.
pub async fn last_activity_by_ids(
    pool: &SqlitePool,
    ids: &[i64],
) -> Result<HashMap<i64, DateTime<Utc>>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders = vec!["?"; ids.len()].join(",");
    let sql = format!("SELECT id, last_activity_at FROM topics WHERE id IN ({placeholders})");

    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id);
    }

    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to fetch last-activity batch")?;

    let mut map = HashMap::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.get("id");
        let raw: String = row.get("last_activity_at");
        match parse_stored_timestamp(&raw) {
            Ok(ts) => {
                map.insert(id, ts);
            }
            Err(e) => warn!(topic_id = id, "Skipping unparseable stored timestamp: {e:#}"),
        }
    }
    Ok(map)
}

/// Topics created or active within the last `hours_back` hours, most
/// recently active first.
pub async fn topics_active_within(pool: &SqlitePool, hours_back: i64) -> Result<Vec<Topic>> {
    sqlx::query_as(
        r"
        SELECT * FROM topics
        WHERE datetime(created_at) >= datetime('now', '-' || ? || ' hours')
           OR datetime(last_activity_at) >= datetime('now', '-' || ? || ' hours')
        ORDER BY last_activity_at DESC
        ",
    )
    .bind(hours_back)
    .bind(hours_back)
    .fetch_all(pool)
    .await
    .context("Failed to fetch recently active topics")
}

/// Delete topics whose last activity is older than the retention window.
/// Posts cascade through the foreign key.
pub async fn delete_topics_inactive_since(pool: &SqlitePool, retention_days: u32) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM topics WHERE datetime(last_activity_at) < datetime('now', '-' || ? || ' days')",
    )
    .bind(i64::from(retention_days))
    .execute(pool)
    .await
    .context("Failed to delete expired topics")?;

    let deleted = result.rows_affected();
    if deleted > 0 {
        info!(deleted, retention_days, "Removed topics past retention window");
    }
    Ok(deleted)
}

// ========== Posts ==========

/// Insert or update a batch of posts in one transaction.
///
/// Conflicts on either the forum post id or (topic_id, post_number) update
/// the existing row's mutable fields instead of inserting a duplicate.
pub async fn upsert_posts(pool: &SqlitePool, posts: &[NewPost]) -> Result<()> {
    if posts.is_empty() {
        return Ok(());
    }

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    for post in posts {
        let post = sanitize_post(post.clone());
        sqlx::query(
            r"
            INSERT INTO posts (
                id, topic_id, user_id, post_number, reply_to_post_number,
                content, like_count, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                like_count = excluded.like_count
            ON CONFLICT(topic_id, post_number) DO UPDATE SET
                content = excluded.content,
                like_count = excluded.like_count
            ",
        )
        .bind(post.id)
        .bind(post.topic_id)
        .bind(post.user_id)
        .bind(post.post_number)
        .bind(post.reply_to_post_number)
        .bind(&post.content)
        .bind(post.like_count)
        .bind(format_timestamp(post.created_at))
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to upsert post {}", post.id))?;
    }

    tx.commit().await.context("Failed to commit post batch")?;
    debug!(count = posts.len(), "Upserted post batch");
    Ok(())
}

/// Fetch all posts of a topic ordered by floor number.
pub async fn get_posts_for_topic(pool: &SqlitePool, topic_id: i64) -> Result<Vec<Post>> {
    sqlx::query_as("SELECT * FROM posts WHERE topic_id = ? ORDER BY post_number")
        .bind(topic_id)
        .fetch_all(pool)
        .await
        .context("Failed to fetch posts for topic")
}

/// Fetch a topic with its main post and up to `limit` top-liked replies
/// (longest first among equal like counts).
pub async fn topic_with_top_replies(
    pool: &SqlitePool,
    topic_id: i64,
    limit: i64,
) -> Result<Option<TopicWithReplies>> {
    let Some(topic) = get_topic(pool, topic_id).await? else {
        return Ok(None);
    };

    let main_post: Option<Post> =
        sqlx::query_as("SELECT * FROM posts WHERE topic_id = ? AND post_number = 1")
            .bind(topic_id)
            .fetch_optional(pool)
            .await
            .context("Failed to fetch main post")?;

    let replies: Vec<Post> = sqlx::query_as(
        r"
        SELECT * FROM posts
        WHERE topic_id = ? AND post_number > 1 AND content IS NOT NULL
        ORDER BY like_count DESC, LENGTH(content) DESC
        LIMIT ?
        ",
    )
    .bind(topic_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to fetch top replies")?;

    Ok(Some(TopicWithReplies {
        topic,
        main_post,
        replies,
    }))
}

// ========== Hotness ==========

/// Recompute `total_like_count` from each topic's posts.
///
/// Returns the number of rows updated. `ids = None` targets every topic.
pub async fn update_total_like_counts(pool: &SqlitePool, ids: Option<&[i64]>) -> Result<u64> {
    let base = r"
        UPDATE topics SET total_like_count = (
            SELECT COALESCE(SUM(p.like_count), 0)
            FROM posts p
            WHERE p.topic_id = topics.id
        )
    ";

    let result = match ids {
        None => sqlx::query(base).execute(pool).await,
        Some([]) => return Ok(0),
        Some(ids) => {
            let placeholders = vec!["?"; ids.len()].join(",");
            let sql = format!("{base} WHERE topics.id IN ({placeholders})");
            let mut query = sqlx::query(&sql);
            for id in ids {
                query = query.bind(id);
            }
            query.execute(pool).await
        }
    }
    .context("Failed to update total like counts")?;

    Ok(result.rows_affected())
}

/// Recompute `hotness_score` in place.
///
/// Score: `clamp(0.1, weighted_counts * decay, max_score)` with
/// `decay = max(0.1, 1 - hours_idle / decay_window_hours)`. Hours idle are
/// derived from `last_activity_at` via julianday arithmetic.
pub async fn update_hotness_scores(
    pool: &SqlitePool,
    weights: &HotnessWeights,
    ids: Option<&[i64]>,
) -> Result<u64> {
    let base = r"
        UPDATE topics SET hotness_score = MIN(?, MAX(0.1,
            (view_count * ? + reply_count * ? + total_like_count * ?) *
            MAX(0.1, 1.0 - (julianday('now') - julianday(last_activity_at)) * 24.0 / ?)
        ))
    ";

    let result = match ids {
        None => {
            sqlx::query(base)
                .bind(weights.max_score)
                .bind(weights.view_weight)
                .bind(weights.reply_weight)
                .bind(weights.like_weight)
                .bind(weights.decay_window_hours)
                .execute(pool)
                .await
        }
        Some([]) => return Ok(0),
        Some(ids) => {
            let placeholders = vec!["?"; ids.len()].join(",");
            let sql = format!("{base} WHERE topics.id IN ({placeholders})");
            let mut query = sqlx::query(&sql)
                .bind(weights.max_score)
                .bind(weights.view_weight)
                .bind(weights.reply_weight)
                .bind(weights.like_weight)
                .bind(weights.decay_window_hours);
            for id in ids {
                query = query.bind(id);
            }
            query.execute(pool).await
        }
    }
    .context("Failed to update hotness scores")?;

    Ok(result.rows_affected())
}

/// Read-side hotness aggregation: totals, heat-level distribution, and the
/// ten hottest categories by average score.
pub async fn hotness_stats(pool: &SqlitePool) -> Result<HotnessStats> {
    let totals = sqlx::query(
        r"
        SELECT
            COUNT(*) AS total_topics,
            COALESCE(AVG(hotness_score), 0.0) AS avg_hotness,
            COALESCE(MAX(hotness_score), 0.0) AS max_hotness,
            COALESCE(MIN(hotness_score), 0.0) AS min_hotness,
            COALESCE(AVG(total_like_count), 0.0) AS avg_likes,
            COALESCE(MAX(total_like_count), 0) AS max_likes
        FROM topics
        WHERE hotness_score > 0
        ",
    )
    .fetch_one(pool)
    .await
    .context("Failed to fetch hotness totals")?;

    let distribution_rows = sqlx::query(
        r"
        SELECT
            CASE
                WHEN hotness_score >= 1000 THEN 'very_hot'
                WHEN hotness_score >= 100 THEN 'hot'
                WHEN hotness_score >= 10 THEN 'warm'
                ELSE 'cool'
            END AS heat_level,
            COUNT(*) AS count
        FROM topics
        WHERE hotness_score > 0
        GROUP BY heat_level
        ",
    )
    .fetch_all(pool)
    .await
    .context("Failed to fetch heat distribution")?;

    let mut heat_distribution = HashMap::new();
    for row in distribution_rows {
        let level: String = row.get("heat_level");
        let count: i64 = row.get("count");
        heat_distribution.insert(level, count);
    }

    let category_stats: Vec<CategoryHotness> = sqlx::query_as(
        r"
        SELECT
            category,
            COUNT(*) AS topic_count,
            AVG(hotness_score) AS avg_hotness,
            MAX(hotness_score) AS max_hotness
        FROM topics
        WHERE category IS NOT NULL AND hotness_score > 0
        GROUP BY category
        ORDER BY avg_hotness DESC
        LIMIT 10
        ",
    )
    .fetch_all(pool)
    .await
    .context("Failed to fetch category hotness")?;

    Ok(HotnessStats {
        total_topics: totals.get("total_topics"),
        avg_hotness: totals.get("avg_hotness"),
        max_hotness: totals.get("max_hotness"),
        min_hotness: totals.get("min_hotness"),
        avg_likes: totals.get("avg_likes"),
        max_likes: totals.get("max_likes"),
        heat_distribution,
        category_stats,
        stats_time: Utc::now(),
    })
}
