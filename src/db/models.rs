use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ListSettings;

/// Storage format for timestamps, matching SQLite's `datetime('now')`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a UTC instant the way timestamps are stored.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).ok()
}

/// A forum account; the viewer of a topic list.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub admin: bool,
    pub moderator: bool,
    pub trust_level: i64,
    pub created_at: String,
    pub new_topic_duration_minutes: Option<i64>,
}

impl User {
    #[must_use]
    pub fn is_staff(&self) -> bool {
        self.admin || self.moderator
    }

    /// Earliest creation time at which a topic still counts as new for this user.
    ///
    /// Topics created before the account existed are never new.
    #[must_use]
    pub fn treat_as_new_topic_start_date(
        &self,
        settings: &ListSettings,
        now: DateTime<Utc>,
    ) -> String {
        let minutes = self
            .new_topic_duration_minutes
            .unwrap_or(settings.new_topic_duration_minutes);
        let window_start = (now - chrono::Duration::minutes(minutes)).naive_utc();
        let start = match parse_timestamp(&self.created_at) {
            Some(created) if created > window_start => created,
            _ => window_start,
        };
        start.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// A topic category.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub parent_category_id: Option<i64>,
    /// The topic backing the category's description page.
    pub topic_id: Option<i64>,
    pub read_restricted: bool,
}

/// A topic as listed to a viewer.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Topic {
    pub id: i64,
    pub title: String,
    pub category_id: Option<i64>,
    pub user_id: Option<i64>,
    pub archetype: String,
    pub bumped_at: String,
    pub created_at: String,
    pub views: i64,
    pub like_count: i64,
    pub posts_count: i64,
    pub highest_post_number: i64,
    pub participant_count: i64,
    pub closed: bool,
    pub archived: bool,
    pub visible: bool,
    pub deleted_at: Option<String>,
    pub pinned_at: Option<String>,
    pub pinned_globally: bool,
    pub pinned_until: Option<String>,
    /// Viewer's read position; `None` when anonymous or never visited.
    pub last_read_post_number: Option<i64>,
    /// Viewer's notification level for the topic, if one was recorded.
    pub notification_level: Option<i64>,
}

impl Topic {
    #[must_use]
    pub fn is_private_message(&self) -> bool {
        self.archetype == Archetype::PrivateMessage.as_str()
    }
}

/// Kind of topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    Regular,
    PrivateMessage,
}

impl Archetype {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::PrivateMessage => "private_message",
        }
    }
}

/// Per-user notification level, shared by topics and categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Muted,
    Regular,
    Tracking,
    Watching,
}

impl NotificationLevel {
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Muted => 0,
            Self::Regular => 1,
            Self::Tracking => 2,
            Self::Watching => 3,
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "muted" => Some(Self::Muted),
            "regular" => Some(Self::Regular),
            "tracking" => Some(Self::Tracking),
            "watching" => Some(Self::Watching),
            _ => None,
        }
    }
}

/// Kinds of post actions a viewer can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostActionType {
    Bookmark,
    Like,
}

impl PostActionType {
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Bookmark => 1,
            Self::Like => 2,
        }
    }
}

/// Data for inserting a new user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub admin: bool,
    pub moderator: bool,
    pub trust_level: i64,
    pub created_at: Option<String>,
    pub new_topic_duration_minutes: Option<i64>,
}

/// Data for inserting a new category.
#[derive(Debug, Clone, Default)]
pub struct NewCategory {
    pub name: String,
    pub slug: String,
    pub parent_category_id: Option<i64>,
    pub read_restricted: bool,
}

/// Data for inserting a new topic.
#[derive(Debug, Clone)]
pub struct NewTopic {
    pub title: String,
    pub category_id: Option<i64>,
    pub user_id: Option<i64>,
    pub archetype: Archetype,
    pub bumped_at: String,
    pub created_at: String,
    pub views: i64,
    pub like_count: i64,
    pub posts_count: i64,
    pub highest_post_number: i64,
    pub participant_count: i64,
    pub closed: bool,
    pub archived: bool,
    pub visible: bool,
    pub deleted_at: Option<String>,
    pub pinned_at: Option<String>,
    pub pinned_globally: bool,
    pub pinned_until: Option<String>,
}

impl NewTopic {
    /// An open, visible, unpinned regular topic created and bumped at `at`.
    #[must_use]
    pub fn new(title: &str, at: &str) -> Self {
        Self {
            title: title.to_string(),
            category_id: None,
            user_id: None,
            archetype: Archetype::Regular,
            bumped_at: at.to_string(),
            created_at: at.to_string(),
            views: 0,
            like_count: 0,
            posts_count: 1,
            highest_post_number: 1,
            participant_count: 1,
            closed: false,
            archived: false,
            visible: true,
            deleted_at: None,
            pinned_at: None,
            pinned_globally: false,
            pinned_until: None,
        }
    }
}

/// Per-viewer topic state to upsert.
#[derive(Debug, Clone, Default)]
pub struct TopicUserState {
    pub last_read_post_number: Option<i64>,
    pub notification_level: Option<NotificationLevel>,
    pub bookmarked: bool,
    pub posted: bool,
    pub last_visited_at: Option<String>,
    pub cleared_pinned_at: Option<String>,
}

/// Data for inserting a new post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub topic_id: i64,
    pub user_id: Option<i64>,
    pub post_number: i64,
    pub raw: String,
    pub like_count: i64,
}

/// Per-period scores for the top list.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopScores {
    pub all_score: f64,
    pub yearly_score: f64,
    pub monthly_score: f64,
    pub weekly_score: f64,
    pub daily_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user(created_at: &str) -> User {
        User {
            id: 1,
            username: "viewer".to_string(),
            admin: false,
            moderator: false,
            trust_level: 1,
            created_at: created_at.to_string(),
            new_topic_duration_minutes: None,
        }
    }

    #[test]
    fn test_new_topic_window_for_old_account() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        let settings = ListSettings {
            new_topic_duration_minutes: 2 * 24 * 60,
            ..ListSettings::default()
        };
        let start = user("2020-01-01 00:00:00").treat_as_new_topic_start_date(&settings, now);
        assert_eq!(start, "2024-06-08 12:00:00");
    }

    #[test]
    fn test_new_topic_window_clamped_to_account_creation() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        let start = user("2024-06-09 08:30:00")
            .treat_as_new_topic_start_date(&ListSettings::default(), now);
        assert_eq!(start, "2024-06-09 08:30:00");
    }

    #[test]
    fn test_per_user_duration_override() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        let mut viewer = user("2020-01-01 00:00:00");
        viewer.new_topic_duration_minutes = Some(60);
        let start = viewer.treat_as_new_topic_start_date(&ListSettings::default(), now);
        assert_eq!(start, "2024-06-10 11:00:00");
    }

    #[test]
    fn test_notification_levels_ordered() {
        assert!(NotificationLevel::Tracking > NotificationLevel::Regular);
        assert_eq!(NotificationLevel::from_str("watching"), Some(NotificationLevel::Watching));
        assert_eq!(NotificationLevel::from_str("loud"), None);
        assert_eq!(NotificationLevel::Muted.as_i64(), 0);
    }
}
