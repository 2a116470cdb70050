use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{
    Category, NewCategory, NewPost, NewTopic, NewUser, NotificationLevel, PostActionType,
    TopScores, Topic, TopicUserState, User,
};

// ========== Users ==========

/// Insert a new user, returning its ID.
pub async fn insert_user(pool: &SqlitePool, user: &NewUser) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO users (username, admin, moderator, trust_level, created_at, new_topic_duration_minutes)
        VALUES (?, ?, ?, ?, COALESCE(?, datetime('now')), ?)
        ",
    )
    .bind(&user.username)
    .bind(user.admin)
    .bind(user.moderator)
    .bind(user.trust_level)
    .bind(&user.created_at)
    .bind(user.new_topic_duration_minutes)
    .execute(pool)
    .await
    .context("Failed to insert user")?;

    Ok(result.last_insert_rowid())
}

/// Get a user by ID.
pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch user")
}

/// Get a user by username.
pub async fn get_user_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    sqlx::query_as("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch user by username")
}

// ========== Groups ==========

/// Insert a group, returning its ID.
pub async fn insert_group(pool: &SqlitePool, name: &str) -> Result<i64> {
    let result = sqlx::query("INSERT INTO user_groups (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await
        .context("Failed to insert group")?;

    Ok(result.last_insert_rowid())
}

pub async fn add_group_user(pool: &SqlitePool, group_id: i64, user_id: i64) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO group_users (group_id, user_id) VALUES (?, ?)")
        .bind(group_id)
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to add group member")?;
    Ok(())
}

/// Let members of `group_id` read a restricted category.
pub async fn grant_category_group(pool: &SqlitePool, category_id: i64, group_id: i64) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO category_groups (category_id, group_id) VALUES (?, ?)")
        .bind(category_id)
        .bind(group_id)
        .execute(pool)
        .await
        .context("Failed to grant category to group")?;
    Ok(())
}

// ========== Categories ==========

/// Insert a new category, returning its ID.
pub async fn insert_category(pool: &SqlitePool, category: &NewCategory) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO categories (name, slug, parent_category_id, read_restricted)
        VALUES (?, ?, ?, ?)
        ",
    )
    .bind(&category.name)
    .bind(&category.slug)
    .bind(category.parent_category_id)
    .bind(category.read_restricted)
    .execute(pool)
    .await
    .context("Failed to insert category")?;

    Ok(result.last_insert_rowid())
}

/// Get a category by ID.
pub async fn get_category(pool: &SqlitePool, id: i64) -> Result<Option<Category>> {
    sqlx::query_as("SELECT * FROM categories WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch category")
}

/// Create the "About the ... category" topic that describes a category and
/// link it as the category's definition. Returns the topic ID.
pub async fn create_category_definition(
    pool: &SqlitePool,
    category_id: i64,
    created_at: &str,
) -> Result<i64> {
    let category = get_category(pool, category_id)
        .await?
        .with_context(|| format!("Category {category_id} not found"))?;

    let mut topic = NewTopic::new(&format!("About the {} category", category.name), created_at);
    topic.category_id = Some(category_id);
    let topic_id = insert_topic(pool, &topic).await?;

    sqlx::query("UPDATE categories SET topic_id = ? WHERE id = ?")
        .bind(topic_id)
        .bind(category_id)
        .execute(pool)
        .await
        .context("Failed to link category definition")?;

    Ok(topic_id)
}

/// Record the user's notification level for a whole category.
pub async fn set_category_notification_level(
    pool: &SqlitePool,
    category_id: i64,
    user_id: i64,
    level: NotificationLevel,
) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO category_users (category_id, user_id, notification_level)
        VALUES (?, ?, ?)
        ON CONFLICT(category_id, user_id) DO UPDATE SET notification_level = excluded.notification_level
        ",
    )
    .bind(category_id)
    .bind(user_id)
    .bind(level.as_i64())
    .execute(pool)
    .await
    .context("Failed to set category notification level")?;
    Ok(())
}

/// IDs of the categories a viewer may read.
///
/// Unrestricted categories are readable by everyone, including anonymous
/// viewers. Restricted ones need a group the user belongs to.
pub async fn get_readable_category_ids(
    pool: &SqlitePool,
    user_id: Option<i64>,
) -> Result<Vec<i64>, sqlx::Error> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        r"
        SELECT c.id FROM categories c
        WHERE c.read_restricted = 0
           OR EXISTS (
                SELECT 1 FROM category_groups cg
                JOIN group_users gu ON gu.group_id = cg.group_id
                WHERE cg.category_id = c.id AND gu.user_id = ?
           )
        ORDER BY c.id
        ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

// ========== Topics ==========

/// Insert a new topic, returning its ID.
pub async fn insert_topic(pool: &SqlitePool, topic: &NewTopic) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO topics (
            title, category_id, user_id, archetype, bumped_at, created_at, views,
            like_count, posts_count, highest_post_number, participant_count, closed,
            archived, visible, deleted_at, pinned_at, pinned_globally, pinned_until
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&topic.title)
    .bind(topic.category_id)
    .bind(topic.user_id)
    .bind(topic.archetype.as_str())
    .bind(&topic.bumped_at)
    .bind(&topic.created_at)
    .bind(topic.views)
    .bind(topic.like_count)
    .bind(topic.posts_count)
    .bind(topic.highest_post_number)
    .bind(topic.participant_count)
    .bind(topic.closed)
    .bind(topic.archived)
    .bind(topic.visible)
    .bind(&topic.deleted_at)
    .bind(&topic.pinned_at)
    .bind(topic.pinned_globally)
    .bind(&topic.pinned_until)
    .execute(pool)
    .await
    .context("Failed to insert topic")?;

    Ok(result.last_insert_rowid())
}

/// Get a topic by ID, without any viewer state.
pub async fn get_topic(pool: &SqlitePool, id: i64) -> Result<Option<Topic>> {
    sqlx::query_as(
        r"
        SELECT topics.*, NULL AS last_read_post_number, NULL AS notification_level
        FROM topics WHERE id = ?
        ",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch topic")
}

/// Insert or replace the viewer's state for a topic.
pub async fn upsert_topic_user(
    pool: &SqlitePool,
    topic_id: i64,
    user_id: i64,
    state: &TopicUserState,
) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO topic_users (
            topic_id, user_id, last_read_post_number, notification_level,
            bookmarked, posted, last_visited_at, cleared_pinned_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(topic_id, user_id) DO UPDATE SET
            last_read_post_number = excluded.last_read_post_number,
            notification_level = excluded.notification_level,
            bookmarked = excluded.bookmarked,
            posted = excluded.posted,
            last_visited_at = excluded.last_visited_at,
            cleared_pinned_at = excluded.cleared_pinned_at
        ",
    )
    .bind(topic_id)
    .bind(user_id)
    .bind(state.last_read_post_number)
    .bind(state.notification_level.map(|level| level.as_i64()))
    .bind(state.bookmarked)
    .bind(state.posted)
    .bind(&state.last_visited_at)
    .bind(&state.cleared_pinned_at)
    .execute(pool)
    .await
    .context("Failed to upsert topic user")?;
    Ok(())
}

/// Add `user_id` to a private message's participants.
pub async fn allow_topic_user(pool: &SqlitePool, topic_id: i64, user_id: i64) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO topic_allowed_users (topic_id, user_id) VALUES (?, ?)")
        .bind(topic_id)
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to allow topic user")?;
    Ok(())
}

pub async fn upsert_top_scores(pool: &SqlitePool, topic_id: i64, scores: &TopScores) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO top_topics (topic_id, all_score, yearly_score, monthly_score, weekly_score, daily_score)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(topic_id) DO UPDATE SET
            all_score = excluded.all_score,
            yearly_score = excluded.yearly_score,
            monthly_score = excluded.monthly_score,
            weekly_score = excluded.weekly_score,
            daily_score = excluded.daily_score
        ",
    )
    .bind(topic_id)
    .bind(scores.all_score)
    .bind(scores.yearly_score)
    .bind(scores.monthly_score)
    .bind(scores.weekly_score)
    .bind(scores.daily_score)
    .execute(pool)
    .await
    .context("Failed to upsert top scores")?;
    Ok(())
}

// ========== Posts ==========

/// Insert a new post, returning its ID. The post's text is indexed for search.
pub async fn insert_post(pool: &SqlitePool, post: &NewPost) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO posts (topic_id, user_id, post_number, raw, like_count)
        VALUES (?, ?, ?, ?, ?)
        ",
    )
    .bind(post.topic_id)
    .bind(post.user_id)
    .bind(post.post_number)
    .bind(&post.raw)
    .bind(post.like_count)
    .execute(pool)
    .await
    .context("Failed to insert post")?;

    Ok(result.last_insert_rowid())
}

/// Record a bookmark or like, returning the action's ID.
pub async fn insert_post_action(
    pool: &SqlitePool,
    post_id: i64,
    user_id: i64,
    action: PostActionType,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO post_actions (post_id, user_id, post_action_type_id) VALUES (?, ?, ?)",
    )
    .bind(post_id)
    .bind(user_id)
    .bind(action.as_i64())
    .execute(pool)
    .await
    .context("Failed to insert post action")?;

    Ok(result.last_insert_rowid())
}

/// Soft-delete a post action. Deleted actions no longer match action filters.
pub async fn delete_post_action(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("UPDATE post_actions SET deleted_at = datetime('now') WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete post action")?;
    Ok(())
}
