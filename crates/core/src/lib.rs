pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;

pub use audit::{AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use domain::invoke::InvokeResponse;
pub use domain::session::{CommandMessage, DialogSession, SessionKey, TEAMS_CHANNEL_ID};
pub use domain::token::{ExchangedToken, IdentityClaims, SsoTokenResponse};
pub use errors::{ApplicationError, DomainError, ExchangeError, FAILED_TO_RETRIEVE_SSO_TOKEN};
pub use flows::{FlowEngine, PromptEvent, PromptState, SsoPromptFlow};
