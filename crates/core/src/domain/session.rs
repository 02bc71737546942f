use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::invoke::InvokeResponse;
use crate::flows::PromptState;

pub const TEAMS_CHANNEL_ID: &str = "msteams";
pub const DEFAULT_PROMPT_TIMEOUT_MS: u64 = 900_000;
pub const MAX_PROMPT_TIMEOUT_MS: u64 = 86_400_000;
pub const MAX_DEDUP_ENTRIES: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub channel_id: String,
    pub conversation_id: String,
    pub user_id: String,
}

impl SessionKey {
    pub fn new(
        channel_id: impl Into<String>,
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Parts are percent-encoded so distinct keys never share a storage key.
    pub fn storage_key(&self) -> String {
        format!(
            "{}/{}/{}",
            urlencoding::encode(&self.channel_id),
            urlencoding::encode(&self.conversation_id),
            urlencoding::encode(&self.user_id)
        )
    }
}

/// Text of the message that triggered a protected command, plus regex captures.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMessage {
    pub text: String,
    pub matches: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupEntry {
    pub response: InvokeResponse,
    pub recorded_at: DateTime<Utc>,
}

/// Persisted snapshot of one in-flight sign-in. Every turn resumes from this value alone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogSession {
    pub key: SessionKey,
    pub state: PromptState,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub pending_correlation_id: Option<String>,
    pub dedup_cache: BTreeMap<String, DedupEntry>,
    pub end_on_invalid_message: bool,
    pub login_hint: Option<String>,
    pub command_id: Option<String>,
    pub command_message: Option<CommandMessage>,
    /// Store-managed optimistic concurrency token; zero means never persisted.
    pub version: u64,
}

impl DialogSession {
    /// The deadline saturates at the latest representable instant.
    pub fn new(
        key: SessionKey,
        scopes: Vec<String>,
        timeout: Duration,
        end_on_invalid_message: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            state: PromptState::Idle,
            scopes,
            created_at: now,
            expires_at: now.checked_add_signed(timeout).unwrap_or(DateTime::<Utc>::MAX_UTC),
            pending_correlation_id: None,
            dedup_cache: BTreeMap::new(),
            end_on_invalid_message,
            login_hint: None,
            command_id: None,
            command_message: None,
            version: 0,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.key.conversation_id
    }

    pub fn user_id(&self) -> &str {
        &self.key.user_id
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn cached_response(&self, correlation_id: &str) -> Option<&InvokeResponse> {
        self.dedup_cache.get(correlation_id).map(|entry| &entry.response)
    }

    pub fn record_response(
        &mut self,
        correlation_id: impl Into<String>,
        response: InvokeResponse,
        now: DateTime<Utc>,
    ) {
        self.dedup_cache.insert(correlation_id.into(), DedupEntry { response, recorded_at: now });

        while self.dedup_cache.len() > MAX_DEDUP_ENTRIES {
            let oldest = self
                .dedup_cache
                .iter()
                .min_by_key(|(_, entry)| entry.recorded_at)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    self.dedup_cache.remove(&id);
                }
                None => break,
            }
        }
    }
}
