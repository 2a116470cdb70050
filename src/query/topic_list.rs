use serde::Serialize;

use crate::config::ListSettings;
use crate::db::Topic;

use super::options::QueryOptions;

/// Which list a [`TopicList`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListFilter {
    Latest,
    New,
    Unread,
    Read,
    Posted,
    Bookmarks,
    Category,
    NewInCategory,
    Top,
    UserTopics,
    PrivateMessages,
    Suggested,
}

impl ListFilter {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::New => "new",
            Self::Unread => "unread",
            Self::Read => "read",
            Self::Posted => "posted",
            Self::Bookmarks => "bookmarks",
            Self::Category => "category",
            Self::NewInCategory => "new_in_category",
            Self::Top => "top",
            Self::UserTopics => "user_topics",
            Self::PrivateMessages => "private_messages",
            Self::Suggested => "suggested",
        }
    }
}

/// An ordered page of topics plus what is needed to link to the next page.
#[derive(Debug, Clone, Serialize)]
pub struct TopicList {
    pub filter: ListFilter,
    pub topics: Vec<Topic>,
    /// Zero-based page index.
    pub page: u32,
    pub per_page: u32,
    pub options: QueryOptions,
}

impl TopicList {
    /// Package already filtered and ordered topics.
    #[must_use]
    pub fn new(
        filter: ListFilter,
        topics: Vec<Topic>,
        options: QueryOptions,
        settings: &ListSettings,
    ) -> Self {
        Self {
            filter,
            topics,
            page: options.page.unwrap_or(0),
            per_page: options.effective_per_page(settings),
            options,
        }
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.per_page)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    #[must_use]
    pub fn topic_ids(&self) -> Vec<i64> {
        self.topics.iter().map(|t| t.id).collect()
    }

    /// The next page index, if this page was full.
    #[must_use]
    pub fn next_page(&self) -> Option<u32> {
        let full = self.topics.len() >= self.per_page as usize;
        (full && self.options.is_limited()).then(|| self.page + 1)
    }
}
