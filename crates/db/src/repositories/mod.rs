use async_trait::async_trait;
use thiserror::Error;

use botsso_core::domain::session::{DialogSession, SessionKey};
use botsso_core::errors::ApplicationError;

pub mod dialog_session;
pub mod memory;

pub use dialog_session::SqlConversationStateStore;
pub use memory::InMemoryConversationStateStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session `{key}` was modified concurrently (expected version {expected})")]
    Conflict { key: String, expected: u64 },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<StoreError> for ApplicationError {
    fn from(error: StoreError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

/// Atomic per-key storage for in-flight sign-in sessions.
///
/// `save` is a compare-and-swap on [`DialogSession::version`]: version zero inserts and
/// fails if a row already exists, any other version must match the stored one. The
/// returned session carries the bumped version.
#[async_trait]
pub trait ConversationStateStore: Send + Sync {
    async fn load(&self, key: &SessionKey) -> Result<Option<DialogSession>, StoreError>;
    async fn save(&self, session: DialogSession) -> Result<DialogSession, StoreError>;
    async fn delete(&self, key: &SessionKey) -> Result<(), StoreError>;
}
