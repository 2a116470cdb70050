//! Per-request list options.
//!
//! The set of option keys is closed: [`QueryOptions::from_map`] rejects any key it
//! does not know before looking at a single value, so a request either gets all of
//! its options applied or none of them.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ListSettings;
use crate::db::NotificationLevel;
use crate::error::{QueryError, QueryResult};

use super::ordering::SortKey;
use super::scope::Bind;

/// Every recognized option key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKey {
    Category,
    Order,
    Ascending,
    Status,
    State,
    Search,
    Filter,
    Page,
    PerPage,
    MinPosts,
    MaxPosts,
    TopicIds,
    ExceptTopicIds,
    Visible,
    NoSubcategories,
    NoDefinitions,
    SlowPlatform,
    ExcludeCategory,
    Limit,
}

impl OptionKey {
    pub const ALL: [Self; 19] = [
        Self::Category,
        Self::Order,
        Self::Ascending,
        Self::Status,
        Self::State,
        Self::Search,
        Self::Filter,
        Self::Page,
        Self::PerPage,
        Self::MinPosts,
        Self::MaxPosts,
        Self::TopicIds,
        Self::ExceptTopicIds,
        Self::Visible,
        Self::NoSubcategories,
        Self::NoDefinitions,
        Self::SlowPlatform,
        Self::ExcludeCategory,
        Self::Limit,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Order => "order",
            Self::Ascending => "ascending",
            Self::Status => "status",
            Self::State => "state",
            Self::Search => "search",
            Self::Filter => "filter",
            Self::Page => "page",
            Self::PerPage => "per_page",
            Self::MinPosts => "min_posts",
            Self::MaxPosts => "max_posts",
            Self::TopicIds => "topic_ids",
            Self::ExceptTopicIds => "except_topic_ids",
            Self::Visible => "visible",
            Self::NoSubcategories => "no_subcategories",
            Self::NoDefinitions => "no_definitions",
            Self::SlowPlatform => "slow_platform",
            Self::ExcludeCategory => "exclude_category",
            Self::Limit => "limit",
        }
    }

    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

/// A category given either by id or by slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CategoryRef {
    Id(i64),
    Slug(String),
}

impl CategoryRef {
    /// Interpret a path segment or option value: numeric means id.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        value
            .trim()
            .parse()
            .map_or_else(|_| Self::Slug(value.trim().to_string()), Self::Id)
    }

    /// SQL expression yielding the category id, resolved inside the query.
    #[must_use]
    pub fn sql_id(&self) -> (&'static str, Bind) {
        match self {
            Self::Id(id) => ("?", Bind::Int(*id)),
            Self::Slug(slug) => (
                "(SELECT id FROM categories WHERE slug = ?)",
                Bind::Text(slug.clone()),
            ),
        }
    }
}

/// Topic status restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicStatus {
    Open,
    Closed,
    Archived,
    Listed,
    Unlisted,
    Deleted,
}

impl TopicStatus {
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            "archived" => Some(Self::Archived),
            "listed" => Some(Self::Listed),
            "unlisted" => Some(Self::Unlisted),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Shortcut filters backed by the viewer's post actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionFilter {
    Bookmarked,
    Liked,
}

impl ActionFilter {
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "bookmarked" => Some(Self::Bookmarked),
            "liked" => Some(Self::Liked),
            _ => None,
        }
    }
}

/// Options for one topic list request. Built once and only read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryOptions {
    pub category: Option<CategoryRef>,
    pub order: SortKey,
    pub ascending: bool,
    pub status: Option<TopicStatus>,
    pub state: Option<NotificationLevel>,
    pub search: Option<String>,
    pub filter: Option<ActionFilter>,
    /// Zero-based page index.
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub min_posts: Option<i64>,
    pub max_posts: Option<i64>,
    pub topic_ids: Option<Vec<i64>>,
    pub except_topic_ids: Vec<i64>,
    pub visible: bool,
    pub no_subcategories: bool,
    pub no_definitions: bool,
    pub slow_platform: bool,
    /// Category name to leave out.
    pub exclude_category: Option<String>,
    /// `Some(false)` drops the page-size limit.
    pub limit: Option<bool>,
}

impl QueryOptions {
    /// Build options from a JSON object of option name to value.
    ///
    /// Numbers and booleans may also be given as strings, as they arrive from a
    /// query string. `null` values count as absent. Unknown `order`, `status`,
    /// `state` and `filter` values impose nothing.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidOption`] for any unrecognized key and
    /// [`QueryError::InvalidValue`] for a recognized key with an unusable value.
    pub fn from_map(map: &Map<String, Value>) -> QueryResult<Self> {
        if let Some(key) = map.keys().find(|k| OptionKey::from_key(k).is_none()) {
            return Err(QueryError::InvalidOption { key: key.clone() });
        }

        let mut options = Self::default();
        for (key, value) in map {
            if value.is_null() {
                continue;
            }
            let Some(option) = OptionKey::from_key(key) else {
                continue;
            };
            options.set(option, value)?;
        }
        Ok(options)
    }

    /// Build options from `key=value` style pairs.
    ///
    /// # Errors
    ///
    /// Same as [`QueryOptions::from_map`].
    pub fn from_pairs<'a, I>(pairs: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let map: Map<String, Value> = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        Self::from_map(&map)
    }

    fn set(&mut self, key: OptionKey, value: &Value) -> QueryResult<()> {
        match key {
            OptionKey::Category => {
                self.category = Some(match value {
                    Value::Number(_) => CategoryRef::Id(as_i64(key, value)?),
                    _ => CategoryRef::parse(&as_string(key, value)?),
                });
            }
            OptionKey::Order => {
                let order = as_string(key, value)?;
                self.order = SortKey::from_str(&order);
            }
            OptionKey::Ascending => self.ascending = as_bool(key, value)?,
            OptionKey::Status => {
                let status = as_string(key, value)?;
                self.status = TopicStatus::from_str(&status);
                if self.status.is_none() {
                    debug!(status = %status, "Ignoring unknown status filter");
                }
            }
            OptionKey::State => {
                let state = as_string(key, value)?;
                self.state = NotificationLevel::from_str(&state);
            }
            OptionKey::Search => {
                let search = as_string(key, value)?;
                self.search = Some(search).filter(|s| !s.trim().is_empty());
            }
            OptionKey::Filter => {
                let filter = as_string(key, value)?;
                self.filter = ActionFilter::from_str(&filter);
            }
            OptionKey::Page => self.page = Some(as_u32(key, value)?),
            OptionKey::PerPage => {
                let per_page = as_u32(key, value)?;
                if per_page == 0 {
                    return Err(invalid(key, "must be at least 1"));
                }
                self.per_page = Some(per_page);
            }
            OptionKey::MinPosts => self.min_posts = Some(as_i64(key, value)?),
            OptionKey::MaxPosts => self.max_posts = Some(as_i64(key, value)?),
            OptionKey::TopicIds => self.topic_ids = Some(as_id_list(key, value)?),
            OptionKey::ExceptTopicIds => self.except_topic_ids = as_id_list(key, value)?,
            OptionKey::Visible => self.visible = as_bool(key, value)?,
            OptionKey::NoSubcategories => self.no_subcategories = as_bool(key, value)?,
            OptionKey::NoDefinitions => self.no_definitions = as_bool(key, value)?,
            OptionKey::SlowPlatform => self.slow_platform = as_bool(key, value)?,
            OptionKey::ExcludeCategory => self.exclude_category = Some(as_string(key, value)?),
            OptionKey::Limit => self.limit = Some(as_bool(key, value)?),
        }
        Ok(())
    }

    /// Page size: the explicit `per_page`, else the slow-platform or regular setting.
    #[must_use]
    pub fn effective_per_page(&self, settings: &ListSettings) -> u32 {
        self.per_page.unwrap_or(if self.slow_platform {
            settings.slow_platform_per_page
        } else {
            settings.per_page
        })
    }

    /// Whether a LIMIT is applied at all.
    #[must_use]
    pub fn is_limited(&self) -> bool {
        self.limit != Some(false)
    }
}

fn invalid(key: OptionKey, message: &str) -> QueryError {
    QueryError::InvalidValue {
        key: key.as_str().to_string(),
        message: message.to_string(),
    }
}

fn as_string(key: OptionKey, value: &Value) -> QueryResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(invalid(key, "expected a string")),
    }
}

fn as_bool(key: OptionKey, value: &Value) -> QueryResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_i64() != Some(0)),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" | "" => Ok(false),
            _ => Err(invalid(key, &format!("expected a boolean, got '{s}'"))),
        },
        _ => Err(invalid(key, "expected a boolean")),
    }
}

fn as_i64(key: OptionKey, value: &Value) -> QueryResult<i64> {
    match value {
        Value::Number(n) => n.as_i64().ok_or_else(|| invalid(key, "expected an integer")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| invalid(key, &format!("expected an integer, got '{s}'"))),
        _ => Err(invalid(key, "expected an integer")),
    }
}

fn as_u32(key: OptionKey, value: &Value) -> QueryResult<u32> {
    let n = as_i64(key, value)?;
    u32::try_from(n).map_err(|_| invalid(key, &format!("out of range: {n}")))
}

/// Accepts an array, a comma separated string, or a single id.
fn as_id_list(key: OptionKey, value: &Value) -> QueryResult<Vec<i64>> {
    match value {
        Value::Array(items) => items.iter().map(|item| as_i64(key, item)).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse()
                    .map_err(|_| invalid(key, &format!("expected topic ids, got '{part}'")))
            })
            .collect(),
        Value::Number(_) => Ok(vec![as_i64(key, value)?]),
        _ => Err(invalid(key, "expected a list of topic ids")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(value: Value) -> QueryResult<QueryOptions> {
        let Value::Object(map) = value else {
            panic!("expected an object");
        };
        QueryOptions::from_map(&map)
    }

    #[test]
    fn test_empty_map_gives_defaults() {
        let opts = options(json!({})).unwrap();
        assert_eq!(opts, QueryOptions::default());
        assert_eq!(opts.order, SortKey::Default);
        assert!(opts.is_limited());
    }

    #[test]
    fn test_unrecognized_key_rejected() {
        let err = options(json!({ "order": "views", "sort_by": "views" })).unwrap_err();
        assert!(matches!(err, QueryError::InvalidOption { key } if key == "sort_by"));
    }

    #[test]
    fn test_unrecognized_key_rejected_before_bad_values() {
        // A bad value on a known key must not mask the unknown key
        let err = options(json!({ "page": "abc", "zzz": 1 })).unwrap_err();
        assert!(matches!(err, QueryError::InvalidOption { key } if key == "zzz"));
    }

    #[test]
    fn test_every_key_round_trips_through_lookup() {
        for key in OptionKey::ALL {
            assert_eq!(OptionKey::from_key(key.as_str()), Some(key));
        }
        assert_eq!(OptionKey::from_key("exclude"), None);
    }

    #[test]
    fn test_string_values_are_coerced() {
        let opts = options(json!({
            "ascending": "true",
            "page": "2",
            "per_page": "10",
            "min_posts": 3,
            "topic_ids": "4, 5,6",
            "except_topic_ids": [7, "8"],
            "category": "support",
            "status": "open",
            "state": "tracking",
            "filter": "liked",
            "limit": false
        }))
        .unwrap();

        assert!(opts.ascending);
        assert_eq!(opts.page, Some(2));
        assert_eq!(opts.per_page, Some(10));
        assert_eq!(opts.min_posts, Some(3));
        assert_eq!(opts.topic_ids, Some(vec![4, 5, 6]));
        assert_eq!(opts.except_topic_ids, vec![7, 8]);
        assert_eq!(opts.category, Some(CategoryRef::Slug("support".to_string())));
        assert_eq!(opts.status, Some(TopicStatus::Open));
        assert_eq!(opts.state, Some(NotificationLevel::Tracking));
        assert_eq!(opts.filter, Some(ActionFilter::Liked));
        assert!(!opts.is_limited());
    }

    #[test]
    fn test_numeric_category_is_an_id() {
        let opts = options(json!({ "category": "12" })).unwrap();
        assert_eq!(opts.category, Some(CategoryRef::Id(12)));
        let opts = options(json!({ "category": 3 })).unwrap();
        assert_eq!(opts.category, Some(CategoryRef::Id(3)));
    }

    #[test]
    fn test_unknown_enumerated_values_impose_nothing() {
        let opts = options(json!({ "status": "sideways", "order": "nonsense", "filter": "x" }))
            .unwrap();
        assert_eq!(opts.status, None);
        assert_eq!(opts.order, SortKey::Default);
        assert_eq!(opts.filter, None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = options(json!({ "page": "two" })).unwrap_err();
        assert!(matches!(err, QueryError::InvalidValue { key, .. } if key == "page"));

        let err = options(json!({ "per_page": 0 })).unwrap_err();
        assert!(matches!(err, QueryError::InvalidValue { key, .. } if key == "per_page"));

        let err = options(json!({ "visible": "maybe" })).unwrap_err();
        assert!(matches!(err, QueryError::InvalidValue { key, .. } if key == "visible"));
    }

    #[test]
    fn test_null_values_are_absent() {
        let opts = options(json!({ "search": null, "page": null })).unwrap();
        assert_eq!(opts.search, None);
        assert_eq!(opts.page, None);
    }

    #[test]
    fn test_blank_search_is_absent() {
        let opts = options(json!({ "search": "   " })).unwrap();
        assert_eq!(opts.search, None);
    }

    #[test]
    fn test_effective_per_page() {
        let settings = ListSettings::default();
        assert_eq!(QueryOptions::default().effective_per_page(&settings), 30);

        let slow = QueryOptions {
            slow_platform: true,
            ..QueryOptions::default()
        };
        assert_eq!(slow.effective_per_page(&settings), 15);

        let explicit = QueryOptions {
            slow_platform: true,
            per_page: Some(50),
            ..QueryOptions::default()
        };
        assert_eq!(explicit.effective_per_page(&settings), 50);
    }

    #[test]
    fn test_from_pairs() {
        let opts = QueryOptions::from_pairs([("order", "likes"), ("ascending", "1")]).unwrap();
        assert_eq!(opts.order, SortKey::Likes);
        assert!(opts.ascending);

        let err = QueryOptions::from_pairs([("bogus", "1")]).unwrap_err();
        assert!(matches!(err, QueryError::InvalidOption { .. }));
    }
}
