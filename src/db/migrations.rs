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

    if current_version < 2 {
        debug!("Running migration v2");
        run_migration_v2(pool).await?;
        set_schema_version(pool, 2).await?;
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

/// Execute a list of statements, attaching `what` to any failure.
async fn execute_all(pool: &SqlitePool, statements: &[(&str, &str)]) -> Result<()> {
    for (what, sql) in statements {
        sqlx::query(sql)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create {what}"))?;
    }
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: creating users, categories and topics");

    execute_all(
        pool,
        &[
            (
                "users table",
                r"
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT UNIQUE NOT NULL,
                    admin INTEGER NOT NULL DEFAULT 0,
                    moderator INTEGER NOT NULL DEFAULT 0,
                    trust_level INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    new_topic_duration_minutes INTEGER
                )
                ",
            ),
            (
                "user_groups table",
                r"
                CREATE TABLE IF NOT EXISTS user_groups (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT UNIQUE NOT NULL
                )
                ",
            ),
            (
                "group_users table",
                r"
                CREATE TABLE IF NOT EXISTS group_users (
                    group_id INTEGER NOT NULL REFERENCES user_groups(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    PRIMARY KEY (group_id, user_id)
                )
                ",
            ),
            (
                "categories table",
                r"
                CREATE TABLE IF NOT EXISTS categories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT UNIQUE NOT NULL,
                    slug TEXT UNIQUE NOT NULL,
                    parent_category_id INTEGER REFERENCES categories(id),
                    topic_id INTEGER,
                    read_restricted INTEGER NOT NULL DEFAULT 0
                )
                ",
            ),
            (
                "category_groups table",
                r"
                CREATE TABLE IF NOT EXISTS category_groups (
                    category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                    group_id INTEGER NOT NULL REFERENCES user_groups(id) ON DELETE CASCADE,
                    PRIMARY KEY (category_id, group_id)
                )
                ",
            ),
            (
                "category_users table",
                r"
                CREATE TABLE IF NOT EXISTS category_users (
                    category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    notification_level INTEGER NOT NULL,
                    PRIMARY KEY (category_id, user_id)
                )
                ",
            ),
            (
                "topics table",
                r"
                CREATE TABLE IF NOT EXISTS topics (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    category_id INTEGER REFERENCES categories(id),
                    user_id INTEGER REFERENCES users(id),
                    archetype TEXT NOT NULL DEFAULT 'regular',
                    bumped_at TEXT NOT NULL DEFAULT (datetime('now')),
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    views INTEGER NOT NULL DEFAULT 0,
                    like_count INTEGER NOT NULL DEFAULT 0,
                    posts_count INTEGER NOT NULL DEFAULT 0,
                    highest_post_number INTEGER NOT NULL DEFAULT 0,
                    participant_count INTEGER NOT NULL DEFAULT 1,
                    closed INTEGER NOT NULL DEFAULT 0,
                    archived INTEGER NOT NULL DEFAULT 0,
                    visible INTEGER NOT NULL DEFAULT 1,
                    deleted_at TEXT,
                    pinned_at TEXT,
                    pinned_globally INTEGER NOT NULL DEFAULT 0,
                    pinned_until TEXT
                )
                ",
            ),
            (
                "topic_users table",
                r"
                CREATE TABLE IF NOT EXISTS topic_users (
                    topic_id INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    last_read_post_number INTEGER,
                    notification_level INTEGER,
                    bookmarked INTEGER NOT NULL DEFAULT 0,
                    posted INTEGER NOT NULL DEFAULT 0,
                    last_visited_at TEXT,
                    cleared_pinned_at TEXT,
                    PRIMARY KEY (topic_id, user_id)
                )
                ",
            ),
            (
                "topic_allowed_users table",
                r"
                CREATE TABLE IF NOT EXISTS topic_allowed_users (
                    topic_id INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    PRIMARY KEY (topic_id, user_id)
                )
                ",
            ),
            (
                "top_topics table",
                r"
                CREATE TABLE IF NOT EXISTS top_topics (
                    topic_id INTEGER PRIMARY KEY REFERENCES topics(id) ON DELETE CASCADE,
                    all_score REAL NOT NULL DEFAULT 0,
                    yearly_score REAL NOT NULL DEFAULT 0,
                    monthly_score REAL NOT NULL DEFAULT 0,
                    weekly_score REAL NOT NULL DEFAULT 0,
                    daily_score REAL NOT NULL DEFAULT 0
                )
                ",
            ),
            (
                "topics bumped_at index",
                "CREATE INDEX IF NOT EXISTS idx_topics_bumped_at ON topics(bumped_at)",
            ),
            (
                "topics category index",
                "CREATE INDEX IF NOT EXISTS idx_topics_category_id ON topics(category_id)",
            ),
            (
                "topic_users user index",
                "CREATE INDEX IF NOT EXISTS idx_topic_users_user_id ON topic_users(user_id)",
            ),
        ],
    )
    .await
}

async fn run_migration_v2(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v2: posts, post actions and search index");

    execute_all(
        pool,
        &[
            (
                "posts table",
                r"
                CREATE TABLE IF NOT EXISTS posts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    topic_id INTEGER NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
                    user_id INTEGER REFERENCES users(id),
                    post_number INTEGER NOT NULL,
                    raw TEXT NOT NULL DEFAULT '',
                    like_count INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE (topic_id, post_number)
                )
                ",
            ),
            (
                "post_actions table",
                r"
                CREATE TABLE IF NOT EXISTS post_actions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    post_action_type_id INTEGER NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    deleted_at TEXT
                )
                ",
            ),
            (
                "post_actions user index",
                "CREATE INDEX IF NOT EXISTS idx_post_actions_user ON post_actions(user_id, post_action_type_id)",
            ),
            (
                "FTS5 table",
                r"
                CREATE VIRTUAL TABLE IF NOT EXISTS post_search USING fts5(
                    raw,
                    content='posts',
                    content_rowid='id'
                )
                ",
            ),
            (
                "FTS insert trigger",
                r"
                CREATE TRIGGER IF NOT EXISTS post_search_insert AFTER INSERT ON posts BEGIN
                    INSERT INTO post_search(rowid, raw) VALUES (new.id, new.raw);
                END
                ",
            ),
            (
                "FTS delete trigger",
                r"
                CREATE TRIGGER IF NOT EXISTS post_search_delete AFTER DELETE ON posts BEGIN
                    INSERT INTO post_search(post_search, rowid, raw) VALUES ('delete', old.id, old.raw);
                END
                ",
            ),
            (
                "FTS update trigger",
                r"
                CREATE TRIGGER IF NOT EXISTS post_search_update AFTER UPDATE ON posts BEGIN
                    INSERT INTO post_search(post_search, rowid, raw) VALUES ('delete', old.id, old.raw);
                    INSERT INTO post_search(rowid, raw) VALUES (new.id, new.raw);
                END
                ",
            ),
        ],
    )
    .await
}
