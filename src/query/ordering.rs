//! Sort key resolution and pagination.

use serde::Serialize;

use super::options::QueryOptions;
use super::scope::{Bind, TopicScope};

/// Requested sort key. Anything unrecognized is [`SortKey::Default`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Default,
    Likes,
    OpLikes,
    Views,
    Posts,
    Activity,
    Posters,
    Category,
    Created,
}

impl SortKey {
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s {
            "likes" => Self::Likes,
            "op_likes" => Self::OpLikes,
            "views" => Self::Views,
            "posts" => Self::Posts,
            "activity" => Self::Activity,
            "posters" => Self::Posters,
            "category" => Self::Category,
            "created" => Self::Created,
            _ => Self::Default,
        }
    }

    fn column(self) -> Option<SortColumn> {
        match self {
            Self::Default => None,
            Self::Likes => Some(SortColumn::LikeCount),
            Self::OpLikes => Some(SortColumn::OpLikes),
            Self::Views => Some(SortColumn::Views),
            Self::Posts => Some(SortColumn::PostsCount),
            Self::Activity => Some(SortColumn::BumpedAt),
            Self::Posters => Some(SortColumn::ParticipantCount),
            Self::Category => Some(SortColumn::CategoryName),
            Self::Created => Some(SortColumn::CreatedAt),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    #[must_use]
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// What a sort key sorts by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    LikeCount,
    /// Like count of the topic's first post.
    OpLikes,
    Views,
    PostsCount,
    BumpedAt,
    ParticipantCount,
    /// Category name; uncategorized topics sort as the empty name.
    CategoryName,
    CreatedAt,
}

impl SortColumn {
    fn expression(self) -> &'static str {
        match self {
            Self::LikeCount => "topics.like_count",
            Self::OpLikes => {
                "(SELECT p3.like_count FROM posts p3 \
                 WHERE p3.topic_id = topics.id AND p3.post_number = 1)"
            }
            Self::Views => "topics.views",
            Self::PostsCount => "topics.posts_count",
            Self::BumpedAt => "topics.bumped_at",
            Self::ParticipantCount => "topics.participant_count",
            Self::CategoryName => "COALESCE(c.name, '')",
            Self::CreatedAt => "topics.created_at",
        }
    }
}

/// Which pins count when pinned topics go first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinScope {
    /// Browsing one category: any pin in it counts.
    Category,
    /// Site-wide lists: only global pins count.
    Global,
}

/// A concrete ordering for a topic list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingRule {
    /// The caller appends its own ordering.
    Unordered,
    /// Active pins first, then most recently bumped.
    PinnedFirst { scope: PinScope },
    Column {
        column: SortColumn,
        direction: Direction,
    },
}

impl OrderingRule {
    /// Resolve the ordering for a request.
    ///
    /// `unordered` marks lists that supply their own default ordering; it only
    /// suppresses the pinned default, never an explicitly requested sort key.
    #[must_use]
    pub fn resolve(options: &QueryOptions, unordered: bool) -> Self {
        let direction = if options.ascending {
            Direction::Asc
        } else {
            Direction::Desc
        };

        match (options.order.column(), direction) {
            (Some(column), direction) => Self::Column { column, direction },
            (None, Direction::Asc) => Self::Column {
                column: SortColumn::BumpedAt,
                direction: Direction::Asc,
            },
            (None, Direction::Desc) if unordered => Self::Unordered,
            (None, Direction::Desc) => Self::PinnedFirst {
                scope: if options.category.is_some() {
                    PinScope::Category
                } else {
                    PinScope::Global
                },
            },
        }
    }

    /// Append this ordering to `scope`. `now` decides whether a pin has expired.
    pub fn apply(self, scope: &mut TopicScope, now: &str) {
        match self {
            Self::Unordered => {}
            Self::PinnedFirst { scope: pins } => pinned_ordering(scope, pins, now),
            Self::Column { column, direction } => {
                let dir = direction.as_sql();
                scope.order_by(format!("{} {dir}", column.expression()), Vec::new());
                if column == SortColumn::CategoryName {
                    scope.order_by("topics.bumped_at DESC", Vec::new());
                }
                scope.order_by(format!("topics.id {dir}"), Vec::new());
            }
        }
    }
}

/// SQL condition for a pin that is still in effect for the viewer.
///
/// A viewer who dismissed the pin after it was set no longer sees it pinned;
/// anonymous viewers have no dismissals.
#[must_use]
pub fn active_pin_condition(scope: &TopicScope, pins: PinScope, now: &str) -> (String, Vec<Bind>) {
    let mut sql = String::from(
        "topics.pinned_at IS NOT NULL AND (topics.pinned_until IS NULL OR topics.pinned_until > ?)",
    );
    if pins == PinScope::Global {
        sql.push_str(" AND topics.pinned_globally = 1");
    }
    if scope.joins_viewer() {
        sql.push_str(" AND (tu.cleared_pinned_at IS NULL OR tu.cleared_pinned_at < topics.pinned_at)");
    }
    (sql, vec![Bind::from(now)])
}

/// Pinned topics first, then by bump time.
pub fn pinned_ordering(scope: &mut TopicScope, pins: PinScope, now: &str) {
    let (condition, binds) = active_pin_condition(scope, pins, now);
    scope
        .order_by(format!("CASE WHEN {condition} THEN 0 ELSE 1 END"), binds)
        .order_by("topics.bumped_at DESC", Vec::new())
        .order_by("topics.id DESC", Vec::new());
}

/// Suggested and unread lists: same category as the topic being read first, then
/// global pins, then bump order.
pub fn suggested_ordering(scope: &mut TopicScope, source_category_id: Option<i64>, now: &str) {
    if let Some(category_id) = source_category_id {
        scope.order_by(
            "CASE WHEN topics.category_id = ? THEN 0 ELSE 1 END",
            vec![Bind::Int(category_id)],
        );
    }
    pinned_ordering(scope, PinScope::Global, now);
}

/// Apply `LIMIT per_page` unless disabled, and `OFFSET page * per_page`.
pub fn paginate(scope: &mut TopicScope, options: &QueryOptions, per_page: u32) {
    let per_page = i64::from(per_page);
    if options.is_limited() {
        scope.limit(per_page);
    }
    if let Some(page) = options.page {
        scope.offset(i64::from(page) * per_page);
    }
}
