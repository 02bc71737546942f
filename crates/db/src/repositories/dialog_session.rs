use chrono::Utc;
use sqlx::Row;

use botsso_core::domain::session::{DialogSession, SessionKey};

use super::{ConversationStateStore, StoreError};
use crate::DbPool;

/// SQLite-backed session store. The session is kept as a JSON blob; the indexed columns
/// exist for operators inspecting the table.
pub struct SqlConversationStateStore {
    pool: DbPool,
}

impl SqlConversationStateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<DialogSession, StoreError> {
    let payload: String =
        row.try_get("payload").map_err(|e| StoreError::Decode(e.to_string()))?;
    let version: i64 = row.try_get("version").map_err(|e| StoreError::Decode(e.to_string()))?;

    let mut session: DialogSession =
        serde_json::from_str(&payload).map_err(|e| StoreError::Decode(e.to_string()))?;
    session.version = u64::try_from(version)
        .map_err(|_| StoreError::Decode(format!("negative session version {version}")))?;
    Ok(session)
}

fn version_to_i64(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version)
        .map_err(|_| StoreError::Decode(format!("session version {version} out of range")))
}

#[async_trait::async_trait]
impl ConversationStateStore for SqlConversationStateStore {
    async fn load(&self, key: &SessionKey) -> Result<Option<DialogSession>, StoreError> {
        let row = sqlx::query(
            "SELECT payload, version FROM dialog_sessions WHERE storage_key = ?",
        )
        .bind(key.storage_key())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_session(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, mut session: DialogSession) -> Result<DialogSession, StoreError> {
        let storage_key = session.key.storage_key();
        let expected = session.version;
        let next_version = version_to_i64(expected + 1)?;

        session.version = expected + 1;
        let payload =
            serde_json::to_string(&session).map_err(|e| StoreError::Decode(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        let result = if expected == 0 {
            sqlx::query(
                "INSERT INTO dialog_sessions (storage_key, channel_id, conversation_id, user_id,
                                              state, expires_at, payload, version, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(storage_key) DO NOTHING",
            )
            .bind(&storage_key)
            .bind(&session.key.channel_id)
            .bind(&session.key.conversation_id)
            .bind(&session.key.user_id)
            .bind(session.state.as_str())
            .bind(session.expires_at.to_rfc3339())
            .bind(&payload)
            .bind(next_version)
            .bind(&now)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                "UPDATE dialog_sessions
                 SET state = ?, expires_at = ?, payload = ?, version = ?, updated_at = ?
                 WHERE storage_key = ? AND version = ?",
            )
            .bind(session.state.as_str())
            .bind(session.expires_at.to_rfc3339())
            .bind(&payload)
            .bind(next_version)
            .bind(&now)
            .bind(&storage_key)
            .bind(version_to_i64(expected)?)
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict { key: storage_key, expected });
        }

        Ok(session)
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM dialog_sessions WHERE storage_key = ?")
            .bind(key.storage_key())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use sqlx::Row;

    use botsso_core::domain::invoke::InvokeResponse;
    use botsso_core::domain::session::{DialogSession, SessionKey};
    use botsso_core::flows::PromptState;

    use super::SqlConversationStateStore;
    use crate::repositories::{ConversationStateStore, StoreError};
    use crate::{connect_with_settings, migrations};

    async fn store() -> SqlConversationStateStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlConversationStateStore::new(pool)
    }

    fn session() -> DialogSession {
        let mut session = DialogSession::new(
            SessionKey::new("msteams", "19:conv", "29:alice"),
            vec!["User.Read".to_owned(), "Mail.Read".to_owned()],
            Duration::minutes(15),
            false,
            Utc::now(),
        );
        session.state = PromptState::CardIssued;
        session.pending_correlation_id = Some("card-1".to_owned());
        session
    }

    #[tokio::test]
    async fn save_then_load_preserves_session() {
        let store = store().await;
        let mut saved = store.save(session()).await.expect("insert");
        assert_eq!(saved.version, 1);

        saved.state = PromptState::ConsentRequired;
        saved.record_response("card-1", InvokeResponse::consent_required(), Utc::now());
        let updated = store.save(saved).await.expect("update");
        assert_eq!(updated.version, 2);

        let loaded = store.load(&updated.key).await.expect("load").expect("row exists");
        assert_eq!(loaded, updated);

        let state: String = sqlx::query("SELECT state FROM dialog_sessions")
            .fetch_one(store.pool())
            .await
            .expect("select state")
            .get("state");
        assert_eq!(state, "consent_required");
    }

    #[tokio::test]
    async fn concurrent_writers_conflict() {
        let store = store().await;
        let saved = store.save(session()).await.expect("insert");

        store.save(saved.clone()).await.expect("first update");
        let error = store.save(saved).await.expect_err("stale update");
        assert!(matches!(error, StoreError::Conflict { expected: 1, .. }));

        let error = store.save(session()).await.expect_err("duplicate insert");
        assert!(matches!(error, StoreError::Conflict { expected: 0, .. }));
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let store = store().await;
        let saved = store.save(session()).await.expect("insert");

        store.delete(&saved.key).await.expect("delete");
        assert!(store.load(&saved.key).await.expect("load").is_none());
        store.delete(&saved.key).await.expect("delete missing row");
    }
}
