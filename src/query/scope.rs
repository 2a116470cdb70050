//! Composable topic SELECT statement.
//!
//! Predicates are collected as SQL fragments with their positional binds and are
//! always joined with `AND`, so every fragment can only narrow the result. The
//! statement is executed as a single query.

use sqlx::SqlitePool;

use crate::db::Topic;

const TOPIC_COLUMNS: &str = "topics.id, topics.title, topics.category_id, topics.user_id, \
    topics.archetype, topics.bumped_at, topics.created_at, topics.views, topics.like_count, \
    topics.posts_count, topics.highest_post_number, topics.participant_count, topics.closed, \
    topics.archived, topics.visible, topics.deleted_at, topics.pinned_at, \
    topics.pinned_globally, topics.pinned_until";

/// A value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bind {
    Int(i64),
    Text(String),
}

impl From<i64> for Bind {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Bind {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Bind {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Fragment {
    sql: String,
    binds: Vec<Bind>,
}

/// `?, ?, ?` for `n` values.
#[must_use]
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// A topic query under construction.
#[derive(Debug, Clone)]
pub struct TopicScope {
    viewer_id: Option<i64>,
    joins: Vec<Fragment>,
    conditions: Vec<Fragment>,
    order_by: Vec<Fragment>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl TopicScope {
    /// Start from every topic, left-joined to its category and, for a signed-in
    /// viewer, to the viewer's `topic_users` row (aliased `tu`).
    #[must_use]
    pub fn new(viewer_id: Option<i64>) -> Self {
        let mut joins = vec![Fragment {
            sql: "LEFT OUTER JOIN categories c ON c.id = topics.category_id".to_string(),
            binds: Vec::new(),
        }];
        if let Some(user_id) = viewer_id {
            joins.push(Fragment {
                sql: "LEFT OUTER JOIN topic_users tu ON tu.topic_id = topics.id AND tu.user_id = ?"
                    .to_string(),
                binds: vec![Bind::Int(user_id)],
            });
        }
        Self {
            viewer_id,
            joins,
            conditions: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Whether the `tu` alias is available to predicates.
    #[must_use]
    pub fn joins_viewer(&self) -> bool {
        self.viewer_id.is_some()
    }

    pub fn join(&mut self, sql: impl Into<String>, binds: Vec<Bind>) -> &mut Self {
        self.joins.push(Fragment {
            sql: sql.into(),
            binds,
        });
        self
    }

    /// Add a predicate, combined with the existing ones by `AND`.
    pub fn filter(&mut self, sql: impl Into<String>, binds: Vec<Bind>) -> &mut Self {
        self.conditions.push(Fragment {
            sql: sql.into(),
            binds,
        });
        self
    }

    /// Append an ordering term after any existing ones.
    pub fn order_by(&mut self, sql: impl Into<String>, binds: Vec<Bind>) -> &mut Self {
        self.order_by.push(Fragment {
            sql: sql.into(),
            binds,
        });
        self
    }

    pub fn limit(&mut self, limit: i64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: i64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn limit_value(&self) -> Option<i64> {
        self.limit
    }

    #[must_use]
    pub fn offset_value(&self) -> Option<i64> {
        self.offset
    }

    /// Predicate fragments in the order they were added.
    pub fn conditions(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(|f| f.sql.as_str())
    }

    /// Ordering fragments in the order they were added.
    pub fn ordering(&self) -> impl Iterator<Item = &str> {
        self.order_by.iter().map(|f| f.sql.as_str())
    }

    /// Render the statement and its binds in placeholder order.
    #[must_use]
    pub fn to_sql(&self) -> (String, Vec<Bind>) {
        let viewer_columns = if self.joins_viewer() {
            "tu.last_read_post_number AS last_read_post_number, \
             tu.notification_level AS notification_level"
        } else {
            "NULL AS last_read_post_number, NULL AS notification_level"
        };

        let mut sql = format!("SELECT {TOPIC_COLUMNS}, {viewer_columns} FROM topics");
        let mut binds = Vec::new();

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.sql);
            binds.extend(join.binds.iter().cloned());
        }

        if !self.conditions.is_empty() {
            let clauses: Vec<String> = self
                .conditions
                .iter()
                .map(|f| format!("({})", f.sql))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
            for condition in &self.conditions {
                binds.extend(condition.binds.iter().cloned());
            }
        }

        if !self.order_by.is_empty() {
            let terms: Vec<&str> = self.order_by.iter().map(|f| f.sql.as_str()).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
            for term in &self.order_by {
                binds.extend(term.binds.iter().cloned());
            }
        }

        // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                binds.push(Bind::Int(limit));
                binds.push(Bind::Int(offset));
            }
            (Some(limit), None) => {
                sql.push_str(" LIMIT ?");
                binds.push(Bind::Int(limit));
            }
            (None, Some(offset)) => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                binds.push(Bind::Int(offset));
            }
            (None, None) => {}
        }

        (sql, binds)
    }

    /// Execute the statement.
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged.
    pub async fn fetch_all(&self, pool: &SqlitePool) -> Result<Vec<Topic>, sqlx::Error> {
        let (sql, binds) = self.to_sql();
        let mut query = sqlx::query_as::<_, Topic>(&sql);
        for bind in binds {
            query = match bind {
                Bind::Int(value) => query.bind(value),
                Bind::Text(value) => query.bind(value),
            };
        }
        query.fetch_all(pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_scope_selects_null_viewer_columns() {
        let (sql, binds) = TopicScope::new(None).to_sql();
        assert!(sql.contains("NULL AS last_read_post_number"));
        assert!(!sql.contains("topic_users"));
        assert!(!sql.contains("WHERE"));
        assert!(binds.is_empty());
    }

    #[test]
    fn test_binds_follow_placeholder_order() {
        let mut scope = TopicScope::new(Some(7));
        scope
            .filter("topics.posts_count >= ?", vec![Bind::Int(2)])
            .filter("c.name <> ?", vec![Bind::from("staff")])
            .order_by("CASE WHEN topics.category_id = ? THEN 0 ELSE 1 END", vec![Bind::Int(3)])
            .limit(10)
            .offset(20);

        let (sql, binds) = scope.to_sql();
        assert!(sql.contains("tu.user_id = ?"));
        assert!(sql.contains("WHERE (topics.posts_count >= ?) AND (c.name <> ?)"));
        assert!(sql.ends_with("LIMIT ? OFFSET ?"));
        assert_eq!(
            binds,
            vec![
                Bind::Int(7),
                Bind::Int(2),
                Bind::from("staff"),
                Bind::Int(3),
                Bind::Int(10),
                Bind::Int(20),
            ]
        );
        assert_eq!(sql.matches('?').count(), binds.len());
    }

    #[test]
    fn test_offset_without_limit() {
        let mut scope = TopicScope::new(None);
        scope.offset(30);
        let (sql, binds) = scope.to_sql();
        assert!(sql.ends_with("LIMIT -1 OFFSET ?"));
        assert_eq!(binds, vec![Bind::Int(30)]);
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(1), "?");
    }
}
