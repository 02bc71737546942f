use serde::{Deserialize, Serialize};
use serde_json::Value;

use botsso_core::domain::session::{SessionKey, TEAMS_CHANNEL_ID};

pub const MESSAGE_ACTIVITY: &str = "message";
pub const INVOKE_ACTIVITY: &str = "invoke";
pub const TOKEN_EXCHANGE_INVOKE: &str = "signin/tokenExchange";
pub const VERIFY_STATE_INVOKE: &str = "signin/verifyState";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad_object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_principal_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: String,
    pub content: Value,
}

/// One Bot Framework activity, inbound or outbound.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub conversation: ConversationAccount,
    #[serde(default)]
    pub from: ChannelAccount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
}

/// Payload of a `signin/tokenExchange` invoke.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenExchangeRequest {
    pub id: String,
    pub token: String,
    #[serde(default)]
    pub connection_name: Option<String>,
}

impl std::fmt::Debug for TokenExchangeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchangeRequest")
            .field("id", &self.id)
            .field("token", &"[REDACTED]")
            .field("connection_name", &self.connection_name)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActivityKind {
    Message { text: String },
    /// `None` when the invoke value is missing or lacks an id or token.
    TokenExchange(Option<TokenExchangeRequest>),
    VerifyState,
    Other,
}

impl Activity {
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            activity_type: MESSAGE_ACTIVITY.to_string(),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn invoke(name: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            activity_type: INVOKE_ACTIVITY.to_string(),
            name: Some(name.into()),
            value,
            ..Self::default()
        }
    }

    pub fn kind(&self) -> ActivityKind {
        match self.activity_type.as_str() {
            MESSAGE_ACTIVITY => {
                ActivityKind::Message { text: self.text.clone().unwrap_or_default() }
            }
            INVOKE_ACTIVITY => match self.name.as_deref() {
                Some(TOKEN_EXCHANGE_INVOKE) => {
                    ActivityKind::TokenExchange(self.token_exchange_request())
                }
                Some(VERIFY_STATE_INVOKE) => ActivityKind::VerifyState,
                _ => ActivityKind::Other,
            },
            _ => ActivityKind::Other,
        }
    }

    pub fn is_invoke(&self) -> bool {
        self.activity_type == INVOKE_ACTIVITY
    }

    pub fn is_teams(&self) -> bool {
        self.channel_id == TEAMS_CHANNEL_ID
    }

    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(&self.channel_id, &self.conversation.id, &self.from.id)
    }

    pub fn token_exchange_request(&self) -> Option<TokenExchangeRequest> {
        let value = self.value.clone()?;
        let request: TokenExchangeRequest = serde_json::from_value(value).ok()?;
        if request.id.trim().is_empty() || request.token.trim().is_empty() {
            return None;
        }
        Some(request)
    }

    /// Text with recipient mentions and line breaks removed, trimmed and lowercased.
    pub fn normalized_text(&self) -> String {
        normalize_text(self.text.as_deref().unwrap_or_default())
    }

    /// Addresses `self` as a reply within the conversation of `inbound`.
    pub fn reply_to(mut self, inbound: &Activity) -> Self {
        self.channel_id = inbound.channel_id.clone();
        self.conversation = inbound.conversation.clone();
        self.recipient = Some(inbound.from.clone());
        if let Some(bot) = &inbound.recipient {
            self.from = bot.clone();
        }
        self.reply_to_id = inbound.id.clone();
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

pub fn normalize_text(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("<at>") {
        stripped.push_str(&rest[..start]);
        match rest[start..].find("</at>") {
            Some(end) => rest = &rest[start + end + "</at>".len()..],
            None => {
                rest = &rest[start..];
                break;
            }
        }
    }
    stripped.push_str(rest);

    stripped.replace(['\r', '\n'], "").trim().to_lowercase()
}
