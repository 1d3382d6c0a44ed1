use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A forum user as stored.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub avatar_url: Option<String>,
    pub first_seen_at: String,
}

/// A user sighting ready for persistence.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: i64,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// A forum topic as stored. Timestamps are RFC 3339 UTC text.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Topic {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub category: Option<String>,
    pub author_id: Option<i64>,
    pub reply_count: i64,
    pub view_count: i64,
    pub created_at: String,
    pub last_activity_at: String,
    pub tags: Option<String>,
    pub total_like_count: i64,
    pub hotness_score: f64,
    pub crawled_at: String,
}

/// A topic sighting ready for persistence.
#[derive(Debug, Clone)]
pub struct NewTopic {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub category: Option<String>,
    pub author_id: Option<i64>,
    pub reply_count: i64,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub tags: String,
}

/// One post within a topic, as stored.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub topic_id: i64,
    pub user_id: Option<i64>,
    pub post_number: i64,
    pub reply_to_post_number: Option<i64>,
    pub content: Option<String>,
    pub like_count: i64,
    pub created_at: String,
}

/// A post ready for persistence.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub id: i64,
    pub topic_id: i64,
    pub user_id: Option<i64>,
    pub post_number: i64,
    pub reply_to_post_number: Option<i64>,
    pub content: String,
    pub like_count: i64,
    pub created_at: DateTime<Utc>,
}

/// A topic together with its main post and top-liked replies, for
/// downstream report generation.
#[derive(Debug, Clone)]
pub struct TopicWithReplies {
    pub topic: Topic,
    pub main_post: Option<Post>,
    pub replies: Vec<Post>,
}

/// Per-category aggregate used in hotness statistics.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryHotness {
    pub category: String,
    pub topic_count: i64,
    pub avg_hotness: f64,
    pub max_hotness: f64,
}

/// Read-side hotness aggregation over scored topics.
#[derive(Debug, Clone)]
pub struct HotnessStats {
    pub total_topics: i64,
    pub avg_hotness: f64,
    pub max_hotness: f64,
    pub min_hotness: f64,
    pub avg_likes: f64,
    pub max_likes: i64,
    /// Counts keyed by heat level: very_hot, hot, warm, cool.
    pub heat_distribution: HashMap<String, i64>,
    pub category_stats: Vec<CategoryHotness>,
    pub stats_time: DateTime<Utc>,
}
