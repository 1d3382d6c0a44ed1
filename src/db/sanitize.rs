//! Field-level sanitization applied before every write.
//!
//! Each entity type has one function that returns a new validated record:
//! strings truncated to their column widths, counts clamped to their column
//! ranges, over-long post content cut at a sentence or paragraph boundary.

use tracing::warn;

use super::models::{NewPost, NewTopic, NewUser};
use crate::constants::{
    CONTENT_BOUNDARY_FLOOR, MAX_AVATAR_URL_CHARS, MAX_CATEGORY_CHARS, MAX_CONTENT_CHARS,
    MAX_SMALL_COUNT, MAX_TAGS_CHARS, MAX_TITLE_CHARS, MAX_URL_CHARS, MAX_USERNAME_CHARS,
    MAX_VIEW_COUNT,
};

#[must_use]
pub fn sanitize_user(user: NewUser) -> NewUser {
    NewUser {
        id: user.id,
        username: truncate_field(user.username, MAX_USERNAME_CHARS, "username"),
        avatar_url: user
            .avatar_url
            .map(|u| truncate_field(u, MAX_AVATAR_URL_CHARS, "avatar_url")),
    }
}

#[must_use]
pub fn sanitize_topic(topic: NewTopic) -> NewTopic {
    NewTopic {
        title: truncate_field(topic.title, MAX_TITLE_CHARS, "title"),
        url: truncate_field(topic.url, MAX_URL_CHARS, "url"),
        category: topic
            .category
            .map(|c| truncate_field(c, MAX_CATEGORY_CHARS, "category")),
        tags: truncate_field(topic.tags, MAX_TAGS_CHARS, "tags"),
        reply_count: clamp_count(topic.reply_count, 0, MAX_SMALL_COUNT, "reply_count"),
        view_count: clamp_count(topic.view_count, 0, MAX_VIEW_COUNT, "view_count"),
        ..topic
    }
}

#[must_use]
pub fn sanitize_post(post: NewPost) -> NewPost {
    NewPost {
        content: truncate_content(post.content),
        post_number: clamp_count(post.post_number, 1, MAX_SMALL_COUNT, "post_number"),
        reply_to_post_number: post
            .reply_to_post_number
            .map(|n| clamp_count(n, 1, MAX_SMALL_COUNT, "reply_to_post_number")),
        like_count: clamp_count(post.like_count, 0, MAX_SMALL_COUNT, "like_count"),
        ..post
    }
}

fn truncate_field(value: String, max_chars: usize, field: &str) -> String {
    let char_count = value.chars().count();
    if char_count <= max_chars {
        return value;
    }
    let truncated: String = value.chars().take(max_chars).collect();
    warn!(
        field,
        original_chars = char_count,
        kept_chars = max_chars,
        "String field truncated to storage limit"
    );
    truncated
}

fn clamp_count(value: i64, min: i64, max: i64, field: &str) -> i64 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!(field, value, clamped, "Numeric field clamped to storage range");
    }
    clamped
}

/// Truncate post content, preferring a paragraph or sentence boundary in
/// the last 20% before the limit, then the last space, then a hard cut.
/// Appends a marker noting the original length.
fn truncate_content(content: String) -> String {
    let char_count = content.chars().count();
    if char_count <= MAX_CONTENT_CHARS {
        return content;
    }

    let hard_cut: String = content.chars().take(MAX_CONTENT_CHARS).collect();
    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let floor_bytes = {
        // The boundary floor is defined over characters; find the byte
        // offset of the floor character so rfind offsets compare cleanly.
        let floor_chars = (MAX_CONTENT_CHARS as f64 * CONTENT_BOUNDARY_FLOOR) as usize;
        hard_cut
            .char_indices()
            .nth(floor_chars)
            .map_or(hard_cut.len(), |(idx, _)| idx)
    };

    let mut truncated = hard_cut.clone();
    let mut boundary_found = false;
    for delimiter in ["\n\n", "\n", "。", "？", "！", ".", "?", "!"] {
        if let Some(pos) = hard_cut.rfind(delimiter) {
            if pos >= floor_bytes {
                truncated = hard_cut[..pos + delimiter.len()].to_string();
                boundary_found = true;
                break;
            }
        }
    }
    if !boundary_found {
        if let Some(pos) = hard_cut.rfind(' ') {
            if pos >= floor_bytes {
                truncated = hard_cut[..pos].to_string();
            }
        }
    }

    warn!(
        original_chars = char_count,
        kept_chars = truncated.chars().count(),
        "Post content truncated"
    );
    truncated.push_str(&format!(
        "\n\n...[content truncated]\noriginal length: {char_count} characters"
    ));
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post_with_content(content: String) -> NewPost {
        NewPost {
            id: 1,
            topic_id: 1,
            user_id: None,
            post_number: 1,
            reply_to_post_number: None,
            content,
            like_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_short_fields_untouched() {
        let user = sanitize_user(NewUser {
            id: 1,
            username: "alice".to_string(),
            avatar_url: Some("https://cdn.example/a.png".to_string()),
        });
        assert_eq!(user.username, "alice");
    }

    #[test]
    fn test_username_truncated() {
        let user = sanitize_user(NewUser {
            id: 1,
            username: "x".repeat(80),
            avatar_url: None,
        });
        assert_eq!(user.username.chars().count(), MAX_USERNAME_CHARS);
    }

    #[test]
    fn test_counts_clamped() {
        let topic = sanitize_topic(NewTopic {
            id: 1,
            title: "t".to_string(),
            url: "https://f.example/t/t/1".to_string(),
            category: None,
            author_id: None,
            reply_count: 1_000_000,
            view_count: -5,
            created_at: Utc::now(),
            last_activity_at: Utc::now(),
            tags: String::new(),
        });
        assert_eq!(topic.reply_count, MAX_SMALL_COUNT);
        assert_eq!(topic.view_count, 0);
    }

    #[test]
    fn test_post_number_floor_is_one() {
        let post = sanitize_post(post_with_content("long enough content here".to_string()));
        assert_eq!(post.post_number, 1);

        let mut raw = post_with_content("content".to_string());
        raw.post_number = 0;
        assert_eq!(sanitize_post(raw).post_number, 1);
    }

    #[test]
    fn test_short_content_untouched() {
        let post = sanitize_post(post_with_content("hello world".to_string()));
        assert_eq!(post.content, "hello world");
    }

    #[test]
    fn test_long_content_cut_at_sentence() {
        // A sentence boundary lands shortly before the limit.
        let sentence = "This is a complete sentence. ";
        let content = sentence.repeat(MAX_CONTENT_CHARS / sentence.len() + 2);
        let post = sanitize_post(post_with_content(content.clone()));

        assert!(post.content.chars().count() < content.chars().count());
        assert!(post.content.contains("...[content truncated]"));
        assert!(post
            .content
            .contains(&format!("original length: {} characters", content.chars().count())));
        // The kept body (before the marker) ends at a sentence boundary.
        let body = post.content.split("\n\n...[content truncated]").next().unwrap();
        assert!(body.ends_with('.') || body.ends_with(". "));
    }

    #[test]
    fn test_long_content_without_boundaries_hard_cut() {
        let content = "a".repeat(MAX_CONTENT_CHARS + 100);
        let post = sanitize_post(post_with_content(content));
        let body = post.content.split("\n\n...[content truncated]").next().unwrap();
        assert_eq!(body.chars().count(), MAX_CONTENT_CHARS);
    }

    #[test]
    fn test_multibyte_content_truncation_is_char_safe() {
        let content = "好".repeat(MAX_CONTENT_CHARS + 50);
        let post = sanitize_post(post_with_content(content));
        assert!(post.content.contains("...[content truncated]"));
    }
}
