use std::collections::HashMap;

use tokio::sync::RwLock;

use botsso_core::domain::session::{DialogSession, SessionKey};

use super::{ConversationStateStore, StoreError};

#[derive(Default)]
pub struct InMemoryConversationStateStore {
    sessions: RwLock<HashMap<String, DialogSession>>,
}

impl InMemoryConversationStateStore {
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ConversationStateStore for InMemoryConversationStateStore {
    async fn load(&self, key: &SessionKey) -> Result<Option<DialogSession>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&key.storage_key()).cloned())
    }

    async fn save(&self, mut session: DialogSession) -> Result<DialogSession, StoreError> {
        let storage_key = session.key.storage_key();
        let mut sessions = self.sessions.write().await;

        let stored_version = sessions.get(&storage_key).map(|stored| stored.version).unwrap_or(0);
        if stored_version != session.version {
            return Err(StoreError::Conflict { key: storage_key, expected: session.version });
        }

        session.version += 1;
        sessions.insert(storage_key, session.clone());
        Ok(session)
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&key.storage_key());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use botsso_core::domain::session::{DialogSession, SessionKey};
    use botsso_core::flows::PromptState;

    use super::InMemoryConversationStateStore;
    use crate::repositories::{ConversationStateStore, StoreError};

    fn session(user: &str) -> DialogSession {
        DialogSession::new(
            SessionKey::new("msteams", "19:conv", user),
            vec!["User.Read".to_owned()],
            Duration::minutes(15),
            true,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn save_then_load_round_trip() {
        let store = InMemoryConversationStateStore::default();
        let saved = store.save(session("29:alice")).await.expect("save");
        assert_eq!(saved.version, 1);

        let loaded = store.load(&saved.key).await.expect("load").expect("session exists");
        assert_eq!(loaded, saved);
        let stranger = SessionKey::new("msteams", "19:conv", "29:bob");
        assert!(store.load(&stranger).await.expect("load").is_none());
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let store = InMemoryConversationStateStore::default();
        let first = store.save(session("29:alice")).await.expect("save");

        let mut winner = first.clone();
        winner.state = PromptState::CardIssued;
        store.save(winner).await.expect("first writer wins");

        let mut loser = first;
        loser.state = PromptState::Cancelled;
        let error = store.save(loser).await.expect_err("second writer must conflict");
        assert!(matches!(error, StoreError::Conflict { expected: 1, .. }));

        let duplicate_insert = store.save(session("29:alice")).await;
        assert!(matches!(duplicate_insert, Err(StoreError::Conflict { expected: 0, .. })));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemoryConversationStateStore::default();
        let saved = store.save(session("29:alice")).await.expect("save");

        store.delete(&saved.key).await.expect("delete");
        store.delete(&saved.key).await.expect("second delete");
        assert!(store.is_empty().await);
    }
}
