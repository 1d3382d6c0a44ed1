//! Wire types for the Discourse JSON endpoints.
//!
//! Listing: `GET <board_url>.json?page=N` returns
//! `{topic_list: {topics: [...]}, users: [...]}`.
//! Detail: `GET <topic_url>.json[?page=N]` returns the topic plus a
//! `post_stream` page and participant details.
//!
//! Individual records are deserialized one by one from `serde_json::Value`
//! so a malformed entry skips that entry, not the whole response.

use chrono::{DateTime, SubsecRound, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::constants::{AVATAR_SIZE, LIKE_ACTION_ID};

/// One topic entry from a board listing page.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingTopic {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    pub category_id: Option<i64>,
    #[serde(default)]
    pub reply_count: i64,
    #[serde(default, rename = "views")]
    pub view_count: i64,
    pub created_at: Option<String>,
    pub last_posted_at: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Topic-level fields of a detail response (first page).
#[derive(Debug, Clone, Deserialize)]
pub struct TopicDetail {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    pub category_id: Option<i64>,
    #[serde(default)]
    pub reply_count: i64,
    #[serde(default, rename = "views")]
    pub view_count: i64,
    pub created_at: Option<String>,
    pub last_posted_at: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub posts_count: i64,
}

/// One post from a detail page's `post_stream`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiPost {
    pub id: i64,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub avatar_template: Option<String>,
    pub post_number: i64,
    pub reply_to_post_number: Option<i64>,
    #[serde(default)]
    pub cooked: String,
    pub created_at: Option<String>,
    #[serde(default)]
    pub actions_summary: Vec<ActionSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionSummary {
    pub id: i64,
    #[serde(default)]
    pub count: i64,
}

/// A participant from a detail response's `details` block.
#[derive(Debug, Clone, Deserialize)]
pub struct Participant {
    pub id: i64,
    pub username: String,
    pub avatar_template: Option<String>,
}

impl ApiPost {
    /// Like count, taken from the `like` entry of `actions_summary`.
    #[must_use]
    pub fn like_count(&self) -> i64 {
        self.actions_summary
            .iter()
            .find(|a| a.id == LIKE_ACTION_ID)
            .map_or(0, |a| a.count)
    }
}

/// Expand a Discourse `avatar_template` into a concrete URL.
#[must_use]
pub fn expand_avatar(template: Option<&str>) -> Option<String> {
    template
        .filter(|t| !t.is_empty())
        .map(|t| t.replace("{size}", AVATAR_SIZE))
}

/// Parse an ISO-8601 timestamp, normalizing to UTC at whole-second
/// precision.
///
/// Discourse emits millisecond timestamps but storage keeps whole seconds;
/// truncating here keeps change detection comparing one granularity, so a
/// stored topic never looks older than the same instant fresh off the wire.
///
/// Missing or malformed values fall back to the current time with a
/// warning, so a single bad record never fails its batch.
#[must_use]
pub fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    match raw {
        Some(s) if !s.is_empty() => DateTime::parse_from_rfc3339(s).map_or_else(
            |e| {
                warn!(raw = s, "Failed to parse timestamp, using now: {e}");
                Utc::now().trunc_subsecs(0)
            },
            |dt| dt.with_timezone(&Utc).trunc_subsecs(0),
        ),
        _ => Utc::now().trunc_subsecs(0),
    }
}

/// Deserialize each element of a JSON array independently, skipping and
/// logging malformed entries.
pub fn parse_records<T: serde::de::DeserializeOwned>(
    values: Option<&Vec<serde_json::Value>>,
    what: &str,
) -> Vec<T> {
    let Some(values) = values else {
        return Vec::new();
    };
    let mut records = Vec::with_capacity(values.len());
    for value in values {
        match serde_json::from_value(value.clone()) {
            Ok(record) => records.push(record),
            Err(e) => warn!(what, "Skipping malformed record: {e}"),
        }
    }
    records
}

/// Pull a JSON array out of a response by path (e.g. `["topic_list", "topics"]`).
#[must_use]
pub fn array_at<'a>(
    value: &'a serde_json::Value,
    path: &[&str],
) -> Option<&'a Vec<serde_json::Value>> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current.as_array()
}
