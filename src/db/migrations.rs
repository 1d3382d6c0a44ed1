use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: creating initial schema");

    // Users table. Ids come from the forum, not from autoincrement.
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            username TEXT UNIQUE NOT NULL,
            avatar_url TEXT,
            first_seen_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    // Topics table
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS topics (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            url TEXT UNIQUE NOT NULL,
            category TEXT,
            author_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
            reply_count INTEGER NOT NULL DEFAULT 0,
            view_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            last_activity_at TEXT NOT NULL,
            tags TEXT,
            total_like_count INTEGER NOT NULL DEFAULT 0,
            hotness_score REAL NOT NULL DEFAULT 0.0,
            crawled_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create topics table")?;

    // Posts table
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY,
            topic_id INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
            user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
            post_number INTEGER NOT NULL,
            reply_to_post_number INTEGER,
            content TEXT,
            like_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            UNIQUE (topic_id, post_number)
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create posts table")?;

    for index_sql in [
        "CREATE INDEX IF NOT EXISTS idx_topics_last_activity ON topics(last_activity_at)",
        "CREATE INDEX IF NOT EXISTS idx_topics_created_at ON topics(created_at)",
        "CREATE INDEX IF NOT EXISTS idx_topics_hotness_score ON topics(hotness_score)",
        "CREATE INDEX IF NOT EXISTS idx_posts_user ON posts(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at)",
    ] {
        sqlx::query(index_sql)
            .execute(pool)
            .await
            .context("Failed to create index")?;
    }

    Ok(())
}
