//! Best-effort conversion of forum HTML ("cooked" post bodies) to plain text.
//!
//! This is a lossy transform: block boundaries become newlines, entities are
//! decoded, everything else is dropped. It never fails; if the parsed
//! document yields nothing for a non-empty input, a regex tag strip is used
//! as a fallback.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

static BLOCK_CLOSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</(?:p|div|li|blockquote|h[1-6]|pre|tr)>|<br\s*/?>").expect("valid regex")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n\s*\n+").expect("valid regex"));
static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("valid regex"));

/// Convert HTML markup to plain text.
///
/// Never fails: on any shortfall in the structured path it falls back to
/// stripping tags and decoding common entities.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    // Turn block-level closers into newlines before parsing so paragraph
    // boundaries survive text extraction.
    let with_breaks = BLOCK_CLOSE_RE.replace_all(html, "\n");
    let fragment = Html::parse_fragment(&with_breaks);
    let text: String = fragment.root_element().text().collect();
    let cleaned = tidy_whitespace(&text);

    if cleaned.is_empty() {
        return tidy_whitespace(&decode_entities(&TAG_RE.replace_all(html, " ")));
    }
    cleaned
}

fn tidy_whitespace(text: &str) -> String {
    let collapsed = SPACES_RE.replace_all(text, " ");
    let collapsed = BLANK_LINES_RE.replace_all(&collapsed, "\n\n");
    collapsed
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}
