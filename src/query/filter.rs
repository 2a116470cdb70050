//! Permission, scope and status predicates for topic lists.
//!
//! [`FilterPipeline::apply`] only ever adds `AND`ed predicates to a
//! [`TopicScope`], so each step can narrow the candidate set but never widen it.
//! Nothing here touches the store.

use crate::db::{parse_search_term, Archetype, NotificationLevel, PostActionType};
use crate::guardian::Guardian;

use super::options::{ActionFilter, CategoryRef, QueryOptions, TopicStatus};
use super::scope::{placeholders, Bind, TopicScope};

/// Builds the conjunctive predicate set for one viewer and one set of options.
#[derive(Debug, Clone, Copy)]
pub struct FilterPipeline<'a> {
    guardian: &'a Guardian,
    options: &'a QueryOptions,
}

impl<'a> FilterPipeline<'a> {
    #[must_use]
    pub fn new(guardian: &'a Guardian, options: &'a QueryOptions) -> Self {
        Self { guardian, options }
    }

    /// Add every predicate, in order.
    pub fn apply(&self, scope: &mut TopicScope) {
        self.listable(scope);
        self.category_scope(scope);
        self.visibility(scope);
        self.id_lists(scope);
        self.search(scope);
        self.notification_state(scope);
        self.status(scope);
        self.action_filter(scope);
        self.post_count_bounds(scope);
        self.category_permissions(scope);
    }

    fn deleted_requested_by_staff(&self) -> bool {
        self.options.status == Some(TopicStatus::Deleted) && self.guardian.is_staff()
    }

    /// Private messages only show up in their own lists.
    fn listable(&self, scope: &mut TopicScope) {
        scope.filter(
            "topics.archetype <> ?",
            vec![Bind::from(Archetype::PrivateMessage.as_str())],
        );
    }

    fn category_scope(&self, scope: &mut TopicScope) {
        if let Some(category) = &self.options.category {
            let (id_sql, bind) = category.sql_id();
            if self.options.no_subcategories {
                scope.filter(format!("c.id = {id_sql}"), vec![bind]);
            } else {
                // Children's definition topics stay out of the parent's list
                scope.filter(
                    format!(
                        "c.id = {id_sql} OR (c.parent_category_id = {id_sql} \
                         AND COALESCE(c.topic_id, 0) <> topics.id)"
                    ),
                    vec![bind.clone(), bind],
                );
            }
        }

        if self.options.no_definitions {
            scope.filter("COALESCE(c.topic_id, 0) <> topics.id", Vec::new());
        }
    }

    fn visibility(&self, scope: &mut TopicScope) {
        if !self.deleted_requested_by_staff() {
            scope.filter("topics.deleted_at IS NULL", Vec::new());
        }
        if self.options.visible || !self.guardian.is_staff() {
            scope.filter("topics.visible = 1", Vec::new());
        }
    }

    fn id_lists(&self, scope: &mut TopicScope) {
        if let Some(name) = &self.options.exclude_category {
            scope.filter(
                "c.name IS NULL OR c.name <> ?",
                vec![Bind::Text(name.clone())],
            );
        }

        if let Some(ids) = &self.options.topic_ids {
            if ids.is_empty() {
                scope.filter("1 = 0", Vec::new());
            } else {
                scope.filter(
                    format!("topics.id IN ({})", placeholders(ids.len())),
                    ids.iter().copied().map(Bind::Int).collect(),
                );
            }
        }

        let except = &self.options.except_topic_ids;
        if !except.is_empty() {
            scope.filter(
                format!("topics.id NOT IN ({})", placeholders(except.len())),
                except.iter().copied().map(Bind::Int).collect(),
            );
        }
    }

    fn search(&self, scope: &mut TopicScope) {
        let Some(raw) = &self.options.search else {
            return;
        };
        let term = parse_search_term(raw);

        // A term with nothing searchable in it matches nothing
        if term.is_empty() {
            scope.filter("1 = 0", Vec::new());
            return;
        }

        if term.has_fts_query() {
            scope.filter(
                "topics.id IN (SELECT p.topic_id FROM post_search \
                 JOIN posts p ON p.id = post_search.rowid \
                 WHERE post_search MATCH ?)",
                vec![Bind::Text(term.fts_query.clone())],
            );
        }
        if let Some(after) = term.created_after {
            scope.filter(
                "topics.created_at >= ?",
                vec![Bind::Text(format!("{after} 00:00:00"))],
            );
        }
        if let Some(before) = term.created_before {
            scope.filter(
                "topics.created_at < ?",
                vec![Bind::Text(format!("{before} 00:00:00"))],
            );
        }
    }

    /// Topics without a per-viewer row count as "regular".
    fn notification_state(&self, scope: &mut TopicScope) {
        let Some(level) = self.options.state else {
            return;
        };
        if !scope.joins_viewer() {
            return;
        }
        scope.filter(
            "COALESCE(tu.notification_level, ?) = ?",
            vec![
                Bind::Int(NotificationLevel::Regular.as_i64()),
                Bind::Int(level.as_i64()),
            ],
        );
    }

    fn status(&self, scope: &mut TopicScope) {
        let Some(status) = self.options.status else {
            return;
        };
        let condition = match status {
            TopicStatus::Open => "topics.closed = 0 AND topics.archived = 0",
            TopicStatus::Closed => "topics.closed = 1",
            TopicStatus::Archived => "topics.archived = 1",
            TopicStatus::Listed => "topics.visible = 1",
            TopicStatus::Unlisted => "topics.visible = 0",
            TopicStatus::Deleted if self.guardian.is_staff() => "topics.deleted_at IS NOT NULL",
            TopicStatus::Deleted => return,
        };
        scope.filter(condition, Vec::new());
    }

    fn action_filter(&self, scope: &mut TopicScope) {
        let Some(filter) = self.options.filter else {
            return;
        };
        // Anonymous viewers have no actions to match
        let Some(user_id) = self.guardian.user_id() else {
            scope.filter("1 = 0", Vec::new());
            return;
        };
        let action = match filter {
            ActionFilter::Bookmarked => PostActionType::Bookmark,
            ActionFilter::Liked => PostActionType::Like,
        };
        scope.filter(
            "topics.id IN (SELECT pp.topic_id FROM post_actions pa \
             JOIN posts pp ON pp.id = pa.post_id \
             WHERE pa.user_id = ? AND pa.post_action_type_id = ? AND pa.deleted_at IS NULL)",
            vec![Bind::Int(user_id), Bind::Int(action.as_i64())],
        );
    }

    fn post_count_bounds(&self, scope: &mut TopicScope) {
        if let Some(max) = self.options.max_posts {
            scope.filter("topics.posts_count <= ?", vec![Bind::Int(max)]);
        }
        if let Some(min) = self.options.min_posts {
            scope.filter("topics.posts_count >= ?", vec![Bind::Int(min)]);
        }
    }

    fn category_permissions(&self, scope: &mut TopicScope) {
        if self.guardian.is_admin() {
            return;
        }
        let allowed = self.guardian.allowed_category_ids();
        if allowed.is_empty() {
            scope.filter("topics.category_id IS NULL", Vec::new());
        } else {
            scope.filter(
                format!(
                    "topics.category_id IS NULL OR topics.category_id IN ({})",
                    placeholders(allowed.len())
                ),
                allowed.iter().copied().map(Bind::Int).collect(),
            );
        }
    }
}

/// Drop topics in categories the viewer muted, except `keep` (the category being
/// browsed, if any). Anonymous viewers have nothing muted.
pub fn remove_muted_categories(scope: &mut TopicScope, user_id: Option<i64>, keep: Option<&CategoryRef>) {
    let Some(user_id) = user_id else {
        return;
    };
    let (keep_sql, keep_bind) = keep.map_or(("?", Bind::Int(-1)), CategoryRef::sql_id);
    scope.filter(
        format!(
            "NOT EXISTS (SELECT 1 FROM category_users cu \
             WHERE cu.user_id = ? AND cu.category_id = topics.category_id \
             AND cu.notification_level = ? AND cu.category_id <> COALESCE({keep_sql}, -1))"
        ),
        vec![
            Bind::Int(user_id),
            Bind::Int(NotificationLevel::Muted.as_i64()),
            keep_bind,
        ],
    );
}

/// Drop the topics that back category description pages.
pub fn remove_category_definitions(scope: &mut TopicScope) {
    scope.filter(
        "topics.id NOT IN (SELECT topic_id FROM categories WHERE topic_id IS NOT NULL)",
        Vec::new(),
    );
}
