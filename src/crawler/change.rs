//! Change detection between harvested listings and stored state.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::listing::HarvestedTopic;

/// Select the topics whose details are worth re-crawling.
///
/// A topic qualifies if it is absent from the store or its harvested
/// `last_activity_at` is strictly newer than the stored one. Topics seen
/// more than once across boards are scheduled once. Order follows the
/// harvest order.
#[must_use]
pub fn plan_detail_crawl(
    harvested: &[HarvestedTopic],
    stored: &HashMap<i64, DateTime<Utc>>,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for topic in harvested {
        if !seen.insert(topic.id) {
            continue;
        }
        match stored.get(&topic.id) {
            None => {
                debug!(topic_id = topic.id, "New topic, scheduling detail crawl");
                urls.push(topic.url.clone());
            }
            Some(last_seen) if topic.last_activity_at > *last_seen => {
                debug!(
                    topic_id = topic.id,
                    stored = %last_seen,
                    harvested = %topic.last_activity_at,
                    "Topic has new activity, scheduling detail crawl"
                );
                urls.push(topic.url.clone());
            }
            Some(_) => {}
        }
    }

    urls
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn topic(id: i64, last_activity_at: DateTime<Utc>) -> HarvestedTopic {
        HarvestedTopic {
            id,
            title: format!("topic {id}"),
            url: format!("https://f.example/t/topic-{id}/{id}"),
            category: None,
            reply_count: 0,
            view_count: 0,
            created_at: last_activity_at,
            last_activity_at,
            tags: String::new(),
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_unknown_topics_are_scheduled() {
        let harvested = vec![topic(1, at(10)), topic(2, at(11))];
        let urls = plan_detail_crawl(&harvested, &HashMap::new());
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0], "https://f.example/t/topic-1/1");
    }

    #[test]
    fn test_newer_activity_is_scheduled() {
        let harvested = vec![topic(1, at(12))];
        let stored = HashMap::from([(1, at(10))]);
        assert_eq!(plan_detail_crawl(&harvested, &stored).len(), 1);
    }

    #[test]
    fn test_equal_activity_is_skipped() {
        let harvested = vec![topic(1, at(10))];
        let stored = HashMap::from([(1, at(10))]);
        assert!(plan_detail_crawl(&harvested, &stored).is_empty());
    }

    #[test]
    fn test_older_activity_is_skipped() {
        // A stale listing cache can report activity older than what a
        // previous crawl stored.
        let harvested = vec![topic(1, at(8))];
        let stored = HashMap::from([(1, at(10))]);
        assert!(plan_detail_crawl(&harvested, &stored).is_empty());
    }

    #[test]
    fn test_subsecond_listing_activity_is_not_rescheduled() {
        // Discourse reports millisecond precision; storage keeps whole
        // seconds. An unchanged topic must compare equal after a store
        // round trip, not strictly newer.
        use crate::crawler::api;
        use crate::db::{format_timestamp, parse_stored_timestamp};

        let harvested_ts = api::parse_timestamp(Some("2024-06-01T08:00:00.769Z"));
        let stored_ts = parse_stored_timestamp(&format_timestamp(harvested_ts)).unwrap();

        let harvested = vec![topic(1, harvested_ts)];
        let stored = HashMap::from([(1, stored_ts)]);
        assert!(plan_detail_crawl(&harvested, &stored).is_empty());
    }

    #[test]
    fn test_duplicate_listings_scheduled_once() {
        // The same topic can surface on two boards in one harvest.
        let harvested = vec![topic(1, at(10)), topic(1, at(10))];
        let urls = plan_detail_crawl(&harvested, &HashMap::new());
        assert_eq!(urls.len(), 1);
    }
}
