//! Discourse topic query library.
//!
//! Builds the topic lists a forum shows its readers (latest, new, unread,
//! per-category, top, private messages) and the "suggested topics" under a topic,
//! on top of a SQLite store.

pub mod config;
pub mod db;
pub mod error;
pub mod guardian;
pub mod query;

pub use error::{QueryError, QueryResult};
pub use guardian::Guardian;
pub use query::{QueryOptions, TopicList, TopicQuery};
