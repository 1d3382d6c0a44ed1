//! Integration tests for database operations.

use chrono::{TimeZone, Utc};
use discourse_hotness_crawler::db::{
    delete_topics_inactive_since, get_posts_for_topic, get_topic, get_user, last_activity_by_ids,
    topic_with_top_replies, upsert_posts, upsert_topic, upsert_topics, upsert_users, Database,
    NewPost, NewTopic, NewUser,
};
use tempfile::TempDir;

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

fn sample_topic(id: i64) -> NewTopic {
    NewTopic {
        id,
        title: format!("Topic {id}"),
        url: format!("https://forum.example.com/t/topic-{id}/{id}"),
        category: Some("7".to_string()),
        author_id: Some(1),
        reply_count: 5,
        view_count: 100,
        created_at: Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
        last_activity_at: Utc.with_ymd_and_hms(2024, 6, 2, 10, 0, 0).unwrap(),
        tags: "ai,llm".to_string(),
    }
}

fn sample_post(id: i64, topic_id: i64, post_number: i64) -> NewPost {
    NewPost {
        id,
        topic_id,
        user_id: None,
        post_number,
        reply_to_post_number: None,
        content: format!("Post {id} with enough substance to keep."),
        like_count: 0,
        created_at: Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap(),
    }
}

#[tokio::test]
async fn test_upsert_and_get_user() {
    let (db, _temp_dir) = setup_db().await;

    let users = vec![NewUser {
        id: 1,
        username: "alice".to_string(),
        avatar_url: Some("/avatars/alice/120.png".to_string()),
    }];
    upsert_users(db.pool(), &users)
        .await
        .expect("Failed to upsert users");

    // User row must exist before topics reference it through author_id.
    let user = get_user(db.pool(), 1)
        .await
        .expect("Failed to get user")
        .expect("User not found");
    assert_eq!(user.username, "alice");
    assert_eq!(user.avatar_url.as_deref(), Some("/avatars/alice/120.png"));
}

#[tokio::test]
async fn test_user_first_seen_survives_resighting() {
    let (db, _temp_dir) = setup_db().await;

    upsert_users(
        db.pool(),
        &[NewUser {
            id: 1,
            username: "alice".to_string(),
            avatar_url: None,
        }],
    )
    .await
    .expect("First upsert failed");
    let first = get_user(db.pool(), 1).await.unwrap().unwrap();

    upsert_users(
        db.pool(),
        &[NewUser {
            id: 1,
            username: "alice_renamed".to_string(),
            avatar_url: Some("/a/120.png".to_string()),
        }],
    )
    .await
    .expect("Second upsert failed");
    let second = get_user(db.pool(), 1).await.unwrap().unwrap();

    assert_eq!(second.username, "alice_renamed");
    assert_eq!(second.avatar_url.as_deref(), Some("/a/120.png"));
    assert_eq!(second.first_seen_at, first.first_seen_at);
}

#[tokio::test]
async fn test_topic_upsert_is_idempotent() {
    let (db, _temp_dir) = setup_db().await;
    upsert_users(
        db.pool(),
        &[NewUser {
            id: 1,
            username: "alice".to_string(),
            avatar_url: None,
        }],
    )
    .await
    .unwrap();

    let topic = sample_topic(10);
    upsert_topic(db.pool(), &topic).await.expect("First upsert");
    upsert_topic(db.pool(), &topic).await.expect("Second upsert");

    let stored = get_topic(db.pool(), 10)
        .await
        .expect("Failed to get topic")
        .expect("Topic not found");
    assert_eq!(stored.title, "Topic 10");
    assert_eq!(stored.view_count, 100);
    assert_eq!(stored.created_at, "2024-06-01T10:00:00Z");
}

#[tokio::test]
async fn test_last_activity_never_regresses() {
    let (db, _temp_dir) = setup_db().await;

    let mut topic = sample_topic(10);
    topic.author_id = None;
    upsert_topic(db.pool(), &topic).await.unwrap();

    // A stale listing carries an older last_activity_at; the stored value
    // must not move backwards.
    topic.last_activity_at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    topic.view_count = 250;
    upsert_topic(db.pool(), &topic).await.unwrap();

    let stored = get_topic(db.pool(), 10).await.unwrap().unwrap();
    assert_eq!(stored.last_activity_at, "2024-06-02T10:00:00Z");
    assert_eq!(stored.view_count, 250);

    // Newer activity does move it forward.
    topic.last_activity_at = Utc.with_ymd_and_hms(2024, 6, 5, 0, 0, 0).unwrap();
    upsert_topic(db.pool(), &topic).await.unwrap();
    let stored = get_topic(db.pool(), 10).await.unwrap().unwrap();
    assert_eq!(stored.last_activity_at, "2024-06-05T00:00:00Z");
}

#[tokio::test]
async fn test_author_id_not_cleared_by_listing_refresh() {
    let (db, _temp_dir) = setup_db().await;
    upsert_users(
        db.pool(),
        &[NewUser {
            id: 1,
            username: "alice".to_string(),
            avatar_url: None,
        }],
    )
    .await
    .unwrap();

    upsert_topic(db.pool(), &sample_topic(10)).await.unwrap();

    // Listing refreshes carry no author.
    let mut refresh = sample_topic(10);
    refresh.author_id = None;
    upsert_topic(db.pool(), &refresh).await.unwrap();

    let stored = get_topic(db.pool(), 10).await.unwrap().unwrap();
    assert_eq!(stored.author_id, Some(1));
}

#[tokio::test]
async fn test_last_activity_batch_lookup() {
    let (db, _temp_dir) = setup_db().await;

    let mut t1 = sample_topic(1);
    t1.author_id = None;
    let mut t2 = sample_topic(2);
    t2.author_id = None;
    upsert_topics(db.pool(), &[t1, t2]).await.unwrap();

    let map = last_activity_by_ids(db.pool(), &[1, 2, 999])
        .await
        .expect("Batch lookup failed");
    assert_eq!(map.len(), 2);
    assert_eq!(
        map[&1],
        Utc.with_ymd_and_hms(2024, 6, 2, 10, 0, 0).unwrap()
    );
    assert!(!map.contains_key(&999));
}

#[tokio::test]
async fn test_post_upsert_is_idempotent_on_both_keys() {
    let (db, _temp_dir) = setup_db().await;
    let mut topic = sample_topic(10);
    topic.author_id = None;
    upsert_topic(db.pool(), &topic).await.unwrap();

    let mut post = sample_post(100, 10, 1);
    upsert_posts(db.pool(), &[post.clone()]).await.unwrap();

    // Same id: content and like_count refresh.
    post.content = "Edited content with enough substance.".to_string();
    post.like_count = 3;
    upsert_posts(db.pool(), &[post.clone()]).await.unwrap();

    let posts = get_posts_for_topic(db.pool(), 10).await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].like_count, 3);
    assert!(posts[0].content.as_deref().unwrap().starts_with("Edited"));

    // Different id but same (topic_id, post_number): still one row.
    upsert_posts(db.pool(), &[sample_post(101, 10, 1)])
        .await
        .unwrap();
    let posts = get_posts_for_topic(db.pool(), 10).await.unwrap();
    assert_eq!(posts.len(), 1);
}

#[tokio::test]
async fn test_topic_with_top_replies_ordering() {
    let (db, _temp_dir) = setup_db().await;
    let mut topic = sample_topic(10);
    topic.author_id = None;
    upsert_topic(db.pool(), &topic).await.unwrap();

    let mut main = sample_post(1, 10, 1);
    main.content = "Main post describing the topic in detail.".to_string();
    let mut short_liked = sample_post(2, 10, 2);
    short_liked.content = "Short but very well liked reply.".to_string();
    short_liked.like_count = 10;
    let mut long_liked = sample_post(3, 10, 3);
    long_liked.content =
        "An equally liked reply that is considerably longer than its sibling reply.".to_string();
    long_liked.like_count = 10;
    let mut unliked = sample_post(4, 10, 4);
    unliked.content = "Nobody liked this reply but it exists.".to_string();

    upsert_posts(db.pool(), &[main, short_liked, long_liked, unliked])
        .await
        .unwrap();

    let bundle = topic_with_top_replies(db.pool(), 10, 2)
        .await
        .expect("Query failed")
        .expect("Topic not found");

    assert_eq!(bundle.main_post.as_ref().map(|p| p.id), Some(1));
    assert_eq!(bundle.replies.len(), 2);
    // Ties on like_count break toward the longer content.
    assert_eq!(bundle.replies[0].id, 3);
    assert_eq!(bundle.replies[1].id, 2);
}

#[tokio::test]
async fn test_retention_cascade_deletes_posts() {
    let (db, _temp_dir) = setup_db().await;

    let mut old_topic = sample_topic(1);
    old_topic.author_id = None;
    old_topic.last_activity_at = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let mut fresh_topic = sample_topic(2);
    fresh_topic.author_id = None;
    fresh_topic.last_activity_at = Utc::now();
    upsert_topics(db.pool(), &[old_topic, fresh_topic])
        .await
        .unwrap();
    upsert_posts(db.pool(), &[sample_post(1, 1, 1), sample_post(2, 2, 1)])
        .await
        .unwrap();

    let deleted = delete_topics_inactive_since(db.pool(), 30)
        .await
        .expect("Cleanup failed");
    assert_eq!(deleted, 1);

    assert!(get_topic(db.pool(), 1).await.unwrap().is_none());
    assert!(get_topic(db.pool(), 2).await.unwrap().is_some());
    assert!(get_posts_for_topic(db.pool(), 1).await.unwrap().is_empty());
    assert_eq!(get_posts_for_topic(db.pool(), 2).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_oversized_fields_are_truncated() {
    let (db, _temp_dir) = setup_db().await;

    let mut topic = sample_topic(10);
    topic.author_id = None;
    topic.title = "t".repeat(600);
    topic.view_count = 9_999_999_999;
    topic.reply_count = -5;
    upsert_topic(db.pool(), &topic).await.unwrap();

    let stored = get_topic(db.pool(), 10).await.unwrap().unwrap();
    assert_eq!(stored.title.chars().count(), 500);
    assert_eq!(stored.view_count, 4_294_967_295);
    assert_eq!(stored.reply_count, 0);
}
