//! Shared constants used across the application.

/// User agent sent with every forum request.
///
/// A realistic browser user agent keeps the JSON endpoints from serving the
/// crawler a degraded or blocked response.
pub const CRAWLER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Avatar size substituted into Discourse `avatar_template` URLs.
pub const AVATAR_SIZE: &str = "120";

/// Discourse action id for a "like" in `actions_summary`.
pub const LIKE_ACTION_ID: i64 = 2;

// Storage limits. String limits are in characters, matching the column
// widths the schema was sized for.
pub const MAX_USERNAME_CHARS: usize = 50;
pub const MAX_AVATAR_URL_CHARS: usize = 200;
pub const MAX_TITLE_CHARS: usize = 500;
pub const MAX_URL_CHARS: usize = 200;
pub const MAX_CATEGORY_CHARS: usize = 50;
pub const MAX_TAGS_CHARS: usize = 500;
pub const MAX_CONTENT_CHARS: usize = 20_000;

pub const MAX_SMALL_COUNT: i64 = 65_535;
pub const MAX_VIEW_COUNT: i64 = 4_294_967_295;

/// Fraction of the content limit below which a sentence/paragraph boundary
/// is considered too early to truncate at.
pub const CONTENT_BOUNDARY_FLOOR: f64 = 0.8;

/// Exact-match replies that carry no analyzable content. Compared against
/// trimmed, lowercased post text.
pub const BOILERPLATE_REPLIES: &[&str] = &[
    "thanks",
    "thank you",
    "+1",
    "mark",
    "感谢分享",
    "谢谢分享",
    "学习了",
    "支持",
    "插眼",
    "好人一生平安",
];
