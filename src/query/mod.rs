//! Topic lists for a viewer.
//!
//! [`TopicQuery`] ties the pieces together: [`FilterPipeline`] narrows the
//! candidates, [`OrderingRule`] sorts and pages them, the store runs the composed
//! statement, and [`TopicList`] packages the result.

pub mod filter;
pub mod options;
pub mod ordering;
pub mod scope;
pub mod suggested;
pub mod topic_list;

pub use filter::{remove_category_definitions, remove_muted_categories, FilterPipeline};
pub use options::{ActionFilter, CategoryRef, OptionKey, QueryOptions, TopicStatus};
pub use ordering::{Direction, OrderingRule, PinScope, SortColumn, SortKey};
pub use scope::{Bind, TopicScope};
pub use suggested::{SuggestedTopicsBuilder, SuggestionTier, TierOutcome};
pub use topic_list::{ListFilter, TopicList};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;

use crate::config::ListSettings;
use crate::db::{format_timestamp, Archetype, NotificationLevel, Topic, User};
use crate::error::QueryResult;
use crate::guardian::Guardian;

use ordering::{active_pin_condition, paginate, suggested_ordering};

/// How many topics the "new in category" list shows.
const NEW_IN_CATEGORY_LIMIT: u32 = 25;

/// Scoring window for the top list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TopPeriod {
    All,
    Yearly,
    Monthly,
    Weekly,
    Daily,
}

impl TopPeriod {
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
            "yearly" => Some(Self::Yearly),
            "monthly" => Some(Self::Monthly),
            "weekly" => Some(Self::Weekly),
            "daily" => Some(Self::Daily),
            _ => None,
        }
    }

    fn score_column(self) -> &'static str {
        match self {
            Self::All => "top_topics.all_score",
            Self::Yearly => "top_topics.yearly_score",
            Self::Monthly => "top_topics.monthly_score",
            Self::Weekly => "top_topics.weekly_score",
            Self::Daily => "top_topics.daily_score",
        }
    }
}

/// Suggested topics plus what each tier contributed.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestions {
    pub list: TopicList,
    pub tiers: Vec<TierOutcome>,
}

/// Topic lists for one viewer and one set of request options.
#[derive(Debug)]
pub struct TopicQuery<'a> {
    pool: &'a SqlitePool,
    guardian: &'a Guardian,
    settings: ListSettings,
    options: QueryOptions,
    now: DateTime<Utc>,
}

impl<'a> TopicQuery<'a> {
    #[must_use]
    pub fn new(
        pool: &'a SqlitePool,
        guardian: &'a Guardian,
        settings: ListSettings,
        options: QueryOptions,
    ) -> Self {
        Self {
            pool,
            guardian,
            settings,
            options,
            now: Utc::now(),
        }
    }

    /// Evaluate pin expiry and the "new" window as of `now`.
    #[must_use]
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    #[must_use]
    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    fn user(&self) -> Option<&User> {
        self.guardian.user()
    }

    fn now_str(&self) -> String {
        format_timestamp(self.now)
    }

    /// Filtered, ordered and paged candidates for `options`.
    fn default_results(&self, options: &QueryOptions, unordered: bool) -> TopicScope {
        let mut scope = TopicScope::new(self.guardian.user_id());
        FilterPipeline::new(self.guardian, options).apply(&mut scope);
        OrderingRule::resolve(options, unordered).apply(&mut scope, &self.now_str());
        paginate(&mut scope, options, options.effective_per_page(&self.settings));
        scope
    }

    async fn create_list(
        &self,
        filter: ListFilter,
        options: QueryOptions,
        scope: &TopicScope,
    ) -> QueryResult<TopicList> {
        let topics = scope.fetch_all(self.pool).await?;
        debug!(
            filter = filter.as_str(),
            viewer = ?self.guardian.user_id(),
            count = topics.len(),
            "Listed topics"
        );
        Ok(TopicList::new(filter, topics, options, &self.settings))
    }

    fn empty_list(&self, filter: ListFilter, options: QueryOptions) -> TopicList {
        TopicList::new(filter, Vec::new(), options, &self.settings)
    }

    fn latest_results(&self, options: &QueryOptions) -> TopicScope {
        let mut scope = self.default_results(options, false);
        remove_muted_categories(&mut scope, self.guardian.user_id(), options.category.as_ref());
        scope
    }

    /// Read but not caught up, for viewers tracking or watching the topic.
    fn unread_results(&self, options: &QueryOptions, source_category_id: Option<i64>) -> TopicScope {
        let mut scope = self.default_results(options, true);
        scope
            .filter(
                "tu.last_read_post_number < topics.highest_post_number",
                Vec::new(),
            )
            .filter(
                "COALESCE(tu.notification_level, ?) >= ?",
                vec![
                    Bind::Int(NotificationLevel::Regular.as_i64()),
                    Bind::Int(NotificationLevel::Tracking.as_i64()),
                ],
            )
            .order_by(
                "CASE WHEN topics.user_id = tu.user_id THEN 1 ELSE 2 END",
                Vec::new(),
            );
        suggested_ordering(&mut scope, source_category_id, &self.now_str());
        scope
    }

    /// Created inside the viewer's "new" window and never opened.
    fn new_results(
        &self,
        user: &User,
        options: &QueryOptions,
        source_category_id: Option<i64>,
    ) -> TopicScope {
        let start = user.treat_as_new_topic_start_date(&self.settings, self.now);
        let mut scope = self.default_results(options, true);
        scope
            .filter("topics.created_at >= ?", vec![Bind::Text(start)])
            .filter("tu.last_read_post_number IS NULL", Vec::new())
            .filter(
                "COALESCE(tu.notification_level, ?) >= ?",
                vec![
                    Bind::Int(NotificationLevel::Tracking.as_i64()),
                    Bind::Int(NotificationLevel::Tracking.as_i64()),
                ],
            );
        remove_muted_categories(&mut scope, Some(user.id), options.category.as_ref());
        suggested_ordering(&mut scope, source_category_id, &self.now_str());
        scope
    }

    /// # Errors
    ///
    /// Returns the store's error unchanged.
    pub async fn list_latest(&self) -> QueryResult<TopicList> {
        let scope = self.latest_results(&self.options);
        self.create_list(ListFilter::Latest, self.options.clone(), &scope)
            .await
    }

    /// Empty for anonymous viewers.
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged.
    pub async fn list_new(&self) -> QueryResult<TopicList> {
        let Some(user) = self.user() else {
            return Ok(self.empty_list(ListFilter::New, self.options.clone()));
        };
        let scope = self.new_results(user, &self.options, None);
        self.create_list(ListFilter::New, self.options.clone(), &scope)
            .await
    }

    /// Empty for anonymous viewers.
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged.
    pub async fn list_unread(&self) -> QueryResult<TopicList> {
        if self.user().is_none() {
            return Ok(self.empty_list(ListFilter::Unread, self.options.clone()));
        }
        let scope = self.unread_results(&self.options, None);
        self.create_list(ListFilter::Unread, self.options.clone(), &scope)
            .await
    }

    /// Topics the viewer has opened, most recently visited first.
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged.
    pub async fn list_read(&self) -> QueryResult<TopicList> {
        if self.user().is_none() {
            return Ok(self.empty_list(ListFilter::Read, self.options.clone()));
        }
        let mut scope = self.default_results(&self.options, true);
        scope
            .filter("tu.last_read_post_number IS NOT NULL", Vec::new())
            .order_by("COALESCE(tu.last_visited_at, topics.bumped_at) DESC", Vec::new())
            .order_by("topics.id DESC", Vec::new());
        self.create_list(ListFilter::Read, self.options.clone(), &scope)
            .await
    }

    /// # Errors
    ///
    /// Returns the store's error unchanged.
    pub async fn list_posted(&self) -> QueryResult<TopicList> {
        if self.user().is_none() {
            return Ok(self.empty_list(ListFilter::Posted, self.options.clone()));
        }
        let mut scope = self.default_results(&self.options, false);
        scope.filter("tu.posted = 1", Vec::new());
        self.create_list(ListFilter::Posted, self.options.clone(), &scope)
            .await
    }

    /// # Errors
    ///
    /// Returns the store's error unchanged.
    pub async fn list_bookmarks(&self) -> QueryResult<TopicList> {
        if self.user().is_none() {
            return Ok(self.empty_list(ListFilter::Bookmarks, self.options.clone()));
        }
        let mut scope = self.default_results(&self.options, false);
        scope.filter("tu.bookmarked = 1", Vec::new());
        self.create_list(ListFilter::Bookmarks, self.options.clone(), &scope)
            .await
    }

    /// Topics in `category` and its subcategories. Muted categories are not
    /// removed here: browsing a category shows it regardless.
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged.
    pub async fn list_category(&self, category: CategoryRef) -> QueryResult<TopicList> {
        let options = QueryOptions {
            category: Some(category),
            ..self.options.clone()
        };
        let scope = self.default_results(&options, false);
        self.create_list(ListFilter::Category, options, &scope).await
    }

    /// The newest topics in `category`.
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged.
    pub async fn list_new_in_category(&self, category: CategoryRef) -> QueryResult<TopicList> {
        let options = QueryOptions {
            category: Some(category),
            per_page: Some(NEW_IN_CATEGORY_LIMIT),
            ..self.options.clone()
        };
        let mut scope = self.default_results(&options, true);
        scope
            .order_by("topics.created_at DESC", Vec::new())
            .order_by("topics.id DESC", Vec::new());
        self.create_list(ListFilter::NewInCategory, options, &scope)
            .await
    }

    /// Highest scoring topics for `period`.
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged.
    pub async fn list_top(&self, period: TopPeriod) -> QueryResult<TopicList> {
        let score = period.score_column();
        let mut scope = self.default_results(&self.options, true);
        scope
            .join("JOIN top_topics ON top_topics.topic_id = topics.id", Vec::new())
            .filter(format!("{score} > 0"), Vec::new());

        // New users see category pins on top of the yearly list
        let new_user = self.user().is_some_and(|u| u.trust_level == 0);
        if period == TopPeriod::Yearly && new_user {
            let (pinned, binds) = active_pin_condition(&scope, PinScope::Category, &self.now_str());
            scope.order_by(
                format!("CASE WHEN topics.category_id IS NOT NULL AND {pinned} THEN 0 ELSE 1 END"),
                binds,
            );
        }
        scope
            .order_by(format!("{score} DESC"), Vec::new())
            .order_by("topics.bumped_at DESC", Vec::new())
            .order_by("topics.id DESC", Vec::new());
        self.create_list(ListFilter::Top, self.options.clone(), &scope)
            .await
    }

    /// Topics started by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged.
    pub async fn list_topics_by(&self, user_id: i64) -> QueryResult<TopicList> {
        let mut scope = self.default_results(&self.options, false);
        scope.filter("topics.user_id = ?", vec![Bind::Int(user_id)]);
        self.create_list(ListFilter::UserTopics, self.options.clone(), &scope)
            .await
    }

    /// Private messages `user` takes part in, most recently bumped first.
    fn private_messages_for(&self, user: &User) -> TopicScope {
        let options = &self.options;
        let mut scope = TopicScope::new(Some(user.id));
        scope
            .filter(
                "topics.archetype = ?",
                vec![Bind::from(Archetype::PrivateMessage.as_str())],
            )
            .filter(
                "topics.id IN (SELECT topic_id FROM topic_allowed_users WHERE user_id = ?)",
                vec![Bind::Int(user.id)],
            )
            .filter("topics.deleted_at IS NULL", Vec::new());
        if options.visible || !self.guardian.is_staff() {
            scope.filter("topics.visible = 1", Vec::new());
        }
        scope
            .order_by("topics.bumped_at DESC", Vec::new())
            .order_by("topics.id DESC", Vec::new());
        paginate(&mut scope, options, options.effective_per_page(&self.settings));
        scope
    }

    /// # Errors
    ///
    /// Returns the store's error unchanged.
    pub async fn list_private_messages(&self, user: &User) -> QueryResult<TopicList> {
        let scope = self.private_messages_for(user);
        self.create_list(ListFilter::PrivateMessages, self.options.clone(), &scope)
            .await
    }

    /// # Errors
    ///
    /// Returns the store's error unchanged.
    pub async fn list_private_messages_sent(&self, user: &User) -> QueryResult<TopicList> {
        let mut scope = self.private_messages_for(user);
        scope.filter("topics.user_id = ?", vec![Bind::Int(user.id)]);
        self.create_list(ListFilter::PrivateMessages, self.options.clone(), &scope)
            .await
    }

    /// # Errors
    ///
    /// Returns the store's error unchanged.
    pub async fn list_private_messages_unread(&self, user: &User) -> QueryResult<TopicList> {
        let mut scope = self.private_messages_for(user);
        scope.filter(
            "tu.last_read_post_number IS NULL OR tu.last_read_post_number < topics.highest_post_number",
            Vec::new(),
        );
        self.create_list(ListFilter::PrivateMessages, self.options.clone(), &scope)
            .await
    }

    /// Up to the configured number of topics to read after `topic`.
    ///
    /// # Errors
    ///
    /// Returns the store's error from whichever tier hit it.
    pub async fn list_suggested_for(&self, topic: &Topic) -> QueryResult<TopicList> {
        Ok(self.suggested_for(topic).await?.list)
    }

    /// Suggested topics, filled tier by tier: unread, then new, then random.
    ///
    /// Each tier sees the ids merged by the tiers before it, and no tier runs once
    /// the budget is spent.
    ///
    /// # Errors
    ///
    /// Returns the store's error from whichever tier hit it.
    pub async fn suggested_for(&self, topic: &Topic) -> QueryResult<Suggestions> {
        let mut builder = SuggestedTopicsBuilder::new(topic, &self.settings);

        if let Some(user) = self.user() {
            let options = self.tier_options(&builder, builder.results_left());
            let scope = self.unread_results(&options, builder.source_category_id());
            let topics = scope.fetch_all(self.pool).await?;
            builder.add_results(SuggestionTier::Unread, topics);

            if builder.category_results_left() > 0 {
                let options = self.tier_options(&builder, builder.category_results_left());
                let scope = self.new_results(user, &options, builder.source_category_id());
                let topics = scope.fetch_all(self.pool).await?;
                builder.add_results(SuggestionTier::New, topics);
            }
        }

        if !builder.is_full() {
            let scope = self.random_suggested(&builder);
            let topics = scope.fetch_all(self.pool).await?;
            builder.add_results(SuggestionTier::Random, topics);
        }

        let (topics, tiers) = builder.into_results();
        debug!(
            topic_id = topic.id,
            viewer = ?self.guardian.user_id(),
            count = topics.len(),
            tiers = ?tiers,
            "Built suggested topics"
        );

        let options = QueryOptions {
            per_page: Some(self.settings.suggested_topics),
            ..QueryOptions::default()
        };
        Ok(Suggestions {
            list: TopicList::new(ListFilter::Suggested, topics, options, &self.settings),
            tiers,
        })
    }

    /// Request options for one suggestion tier: capped at `budget` results and
    /// leaving out everything already excluded.
    fn tier_options(&self, builder: &SuggestedTopicsBuilder, budget: u32) -> QueryOptions {
        let mut except = self.options.except_topic_ids.clone();
        except.extend(builder.excluded_topic_ids());
        except.sort_unstable();
        except.dedup();
        QueryOptions {
            per_page: Some(budget),
            page: None,
            limit: None,
            except_topic_ids: except,
            ..self.options.clone()
        }
    }

    /// Open topics in uniformly random order, the source topic's category first.
    fn random_suggested(&self, builder: &SuggestedTopicsBuilder) -> TopicScope {
        let options = self.tier_options(builder, builder.results_left());
        let mut scope = self.default_results(&options, true);
        scope.filter("topics.closed = 0 AND topics.archived = 0", Vec::new());
        remove_category_definitions(&mut scope);
        remove_muted_categories(&mut scope, self.guardian.user_id(), None);
        if let Some(category_id) = builder.source_category_id() {
            scope.order_by(
                "CASE WHEN topics.category_id = ? THEN 0 ELSE 1 END",
                vec![Bind::Int(category_id)],
            );
        }
        scope.order_by("RANDOM()", Vec::new());
        scope
    }
}
