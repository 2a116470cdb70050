use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_path: PathBuf,

    // Listing and suggestion settings
    pub list: ListSettings,
}

/// Site settings consulted while building topic lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListSettings {
    /// Page size when the caller does not pick one.
    pub per_page: u32,
    /// Page size for clients flagged as slow platforms.
    pub slow_platform_per_page: u32,
    /// How far back a topic still counts as "new" for a viewer.
    pub new_topic_duration_minutes: i64,
    /// Maximum number of suggested topics for one source topic.
    pub suggested_topics: u32,
    /// Budget for the "new" suggestion tier.
    pub suggested_category_topics: u32,
}

impl Default for ListSettings {
    fn default() -> Self {
        Self {
            per_page: 30,
            slow_platform_per_page: 15,
            new_topic_duration_minutes: 7 * 24 * 60,
            suggested_topics: 5,
            suggested_category_topics: 5,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable holds an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = ListSettings::default();
        Ok(Self {
            // Database
            database_path: PathBuf::from(env_or_default("DATABASE_PATH", "./data/topics.sqlite")),

            // Listing and suggestion settings
            list: ListSettings {
                per_page: parse_env_u32("TOPICS_PER_PAGE", defaults.per_page)?,
                slow_platform_per_page: parse_env_u32(
                    "TOPICS_PER_PAGE_SLOW",
                    defaults.slow_platform_per_page,
                )?,
                new_topic_duration_minutes: parse_env_i64(
                    "NEW_TOPIC_DURATION_MINUTES",
                    defaults.new_topic_duration_minutes,
                )?,
                suggested_topics: parse_env_u32("SUGGESTED_TOPICS", defaults.suggested_topics)?,
                suggested_category_topics: parse_env_u32(
                    "SUGGESTED_CATEGORY_TOPICS",
                    defaults.suggested_category_topics,
                )?,
            },
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.list.per_page == 0 {
            return Err(ConfigError::InvalidValue {
                name: "TOPICS_PER_PAGE".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.list.slow_platform_per_page == 0 {
            return Err(ConfigError::InvalidValue {
                name: "TOPICS_PER_PAGE_SLOW".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.list.new_topic_duration_minutes < 0 {
            return Err(ConfigError::InvalidValue {
                name: "NEW_TOPIC_DURATION_MINUTES".to_string(),
                message: "cannot be negative".to_string(),
            });
        }
        if self.list.suggested_topics == 0 {
            return Err(ConfigError::InvalidValue {
                name: "SUGGESTED_TOPICS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.list.suggested_category_topics > self.list.suggested_topics {
            return Err(ConfigError::InvalidValue {
                name: "SUGGESTED_CATEGORY_TOPICS".to_string(),
                message: format!(
                    "cannot exceed SUGGESTED_TOPICS ({})",
                    self.list.suggested_topics
                ),
            });
        }
        Ok(())
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_i64(name: &str, default: i64) -> Result<i64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}
