use thiserror::Error;

/// Errors surfaced by topic list operations.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A query option key outside the recognized set.
    #[error("unrecognized query option: {key}")]
    InvalidOption { key: String },

    /// A recognized query option whose value cannot be used.
    #[error("invalid value for query option {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failure reported by the topic store, passed through untouched.
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

pub type QueryResult<T> = Result<T, QueryError>;
