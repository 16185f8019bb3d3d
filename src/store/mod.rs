//! Persistence seams: the session cache and the database tables.
//!
//! The database is the source of truth for users and their sessions; the
//! cache only shortens session lookups.

mod memory;
mod sqlite;

pub use memory::InMemorySessionCache;
pub use sqlite::{connect, SqliteProfileRepository, SqliteUserRepository};

use async_trait::async_trait;

use crate::models::{RecommendationProfile, Session, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("duplicate key: {0}")]
    Duplicate(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-value cache holding the JSON-serialized session of each user.
/// Entries never expire; they live until overwritten.
#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn get_raw(&self, user_id: &str) -> Result<Option<String>, StoreError>;
    async fn set_raw(&self, user_id: &str, value: String) -> Result<(), StoreError>;

    async fn get(&self, user_id: &str) -> Result<Option<Session>, StoreError> {
        match self.get_raw(user_id).await? {
            Some(blob) => Ok(Some(serde_json::from_str(&blob)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, user_id: &str, session: &Session) -> Result<(), StoreError> {
        let blob = serde_json::to_string(session)?;
        self.set_raw(user_id, blob).await
    }
}

/// The `users` table, keyed by the provider's user id.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find(&self, id: &str) -> Result<Option<User>, StoreError>;
    async fn insert(&self, user: User) -> Result<(), StoreError>;
    /// Replaces only the embedded session of an existing user.
    async fn update_session(&self, id: &str, session: Session) -> Result<(), StoreError>;
}

/// The append-only `recommendation_profiles` table.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn insert(&self, profile: RecommendationProfile) -> Result<(), StoreError>;
    async fn list_for_creator(
        &self,
        creator_id: &str,
    ) -> Result<Vec<RecommendationProfile>, StoreError>;
}
