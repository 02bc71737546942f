use thiserror::Error;

use crate::flows::FlowTransitionError;

pub const FAILED_TO_RETRIEVE_SSO_TOKEN: &str = "Failed to retrieve SSO token";

/// Normalized outcome of a failed delegated token acquisition.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("invalid sso assertion: {0}")]
    InvalidAssertion(String),
    #[error("sso assertion has expired")]
    AssertionExpired,
    #[error("user consent required: {0}")]
    ConsentRequired(String),
    #[error("identity provider failure: {0}")]
    Service(String),
}

impl ExchangeError {
    pub fn is_consent_required(&self) -> bool {
        matches!(self, Self::ConsentRequired(_))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{component} is only supported in the msteams channel, got `{channel}`")]
    ChannelUnsupported { component: String, channel: String },
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error("sso prompt timed out before a token was exchanged")]
    TimedOut,
    #[error("sso prompt cancelled: {0}")]
    Cancelled(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn channel_unsupported(component: impl Into<String>, channel: impl Into<String>) -> Self {
        Self::ChannelUnsupported { component: component.into(), channel: channel.into() }
    }

    /// Whether the failure ended a sign-in attempt rather than rejecting the request.
    pub fn is_sign_in_failure(&self) -> bool {
        matches!(self, Self::TimedOut | Self::Cancelled(_) | Self::Exchange(_))
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::TimedOut | Self::Cancelled(_) | Self::Exchange(_) => {
                FAILED_TO_RETRIEVE_SSO_TOKEN
            }
            Self::ChannelUnsupported { .. } => {
                "Single sign-on is only available inside Microsoft Teams."
            }
            Self::Domain(_) => "The request could not be processed. Check inputs and try again.",
            Self::Persistence(_) => "The service is temporarily unavailable. Please retry shortly.",
            Self::Configuration(_) => "An unexpected internal error occurred.",
        }
    }
}
