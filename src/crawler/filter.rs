//! Content-worthiness filtering for harvested posts.

use tracing::debug;

use crate::constants::BOILERPLATE_REPLIES;

/// Decide whether a post's plain-text content is worth storing.
///
/// Rejects empty or whitespace-only text, text shorter than `min_length`
/// characters, and exact (trimmed, lowercased) matches against the
/// boilerplate denylist. Borderline content is kept: this filter prefers
/// false negatives over losing substance.
#[must_use]
pub fn is_meaningful(content: &str, min_length: usize) -> bool {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return false;
    }

    if trimmed.chars().count() < min_length {
        debug!(content = trimmed, "Filtered short post");
        return false;
    }

    let normalized = trimmed.to_lowercase();
    if BOILERPLATE_REPLIES.iter().any(|p| *p == normalized) {
        debug!(content = trimmed, "Filtered boilerplate reply");
        return false;
    }

    true
}
