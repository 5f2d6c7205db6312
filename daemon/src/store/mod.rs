mod sqlite;

use async_trait::async_trait;

use crate::protocol::{ActivityRecord, NewActivity};

pub use sqlite::SqliteActivityStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("activity not found")]
    NotFound,
    #[error("store backend failure: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        StoreError::Backend(error.to_string())
    }
}

/// Every operation only sees rows owned by `owner`.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn create(&self, owner: &str, activity: NewActivity)
        -> Result<ActivityRecord, StoreError>;

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<ActivityRecord>, StoreError>;

    // newest first, like list_by_owner
    async fn recent_by_owner(
        &self,
        owner: &str,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, StoreError>;

    async fn set_completed(&self, owner: &str, id: i64, completed: bool)
        -> Result<(), StoreError>;

    async fn delete(&self, owner: &str, id: i64) -> Result<(), StoreError>;
}
