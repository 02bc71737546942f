use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptState {
    Idle,
    CardIssued,
    AwaitingExchange,
    ConsentRequired,
    AwaitingConsentAck,
    Completed,
    TimedOut,
    Cancelled,
    Failed,
}

impl PromptState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CardIssued => "card_issued",
            Self::AwaitingExchange => "awaiting_exchange",
            Self::ConsentRequired => "consent_required",
            Self::AwaitingConsentAck => "awaiting_consent_ack",
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "card_issued" => Some(Self::CardIssued),
            "awaiting_exchange" => Some(Self::AwaitingExchange),
            "consent_required" => Some(Self::ConsentRequired),
            "awaiting_consent_ack" => Some(Self::AwaitingConsentAck),
            "completed" => Some(Self::Completed),
            "timed_out" => Some(Self::TimedOut),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Cancelled | Self::Failed)
    }

    /// Idle sessions are never persisted, so only the in-flight states count as active.
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != Self::Idle
    }

    /// States in which a token exchange invoke for the card in flight is accepted.
    pub fn accepts_exchange(&self) -> bool {
        matches!(self, Self::CardIssued | Self::AwaitingExchange)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptEvent {
    CardSent,
    ExchangeRequested,
    ExchangeSucceeded,
    ConsentRequired,
    ConsentAcknowledged,
    ExchangeFailed,
    InvalidMessage,
    DeadlineElapsed,
    CancelRequested,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptAction {
    SendSignInCard,
    ExchangeToken,
    RespondPreconditionFailed,
    ReleaseToken,
    DiscardSession,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: PromptState,
    pub to: PromptState,
    pub event: PromptEvent,
    pub actions: Vec<PromptAction>,
}
