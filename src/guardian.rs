//! Read permissions for the viewer of a topic list.

use sqlx::SqlitePool;

use crate::db::{get_readable_category_ids, User};

/// What the current viewer may see. `None` user means anonymous.
#[derive(Debug, Clone)]
pub struct Guardian {
    user: Option<User>,
    allowed_category_ids: Vec<i64>,
}

impl Guardian {
    #[must_use]
    pub fn new(user: Option<User>, allowed_category_ids: Vec<i64>) -> Self {
        Self {
            user,
            allowed_category_ids,
        }
    }

    /// Look up the categories `user` may read.
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged.
    pub async fn load(pool: &SqlitePool, user: Option<User>) -> Result<Self, sqlx::Error> {
        let allowed = get_readable_category_ids(pool, user.as_ref().map(|u| u.id)).await?;
        Ok(Self::new(user, allowed))
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        self.user.as_ref().map(|u| u.id)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.admin)
    }

    #[must_use]
    pub fn is_staff(&self) -> bool {
        self.user.as_ref().is_some_and(User::is_staff)
    }

    #[must_use]
    pub fn allowed_category_ids(&self) -> &[i64] {
        &self.allowed_category_ids
    }
}
