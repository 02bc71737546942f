use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use botsso_core::audit::{AuditContext, AuditSink};
use botsso_core::config::PromptConfig;
use botsso_core::domain::invoke::{
    InvokeResponse, EXCHANGE_FAILED_DETAIL, MISSING_EXCHANGE_REQUEST_DETAIL, STALE_CARD_DETAIL,
};
use botsso_core::domain::session::{
    CommandMessage, DialogSession, SessionKey, DEFAULT_PROMPT_TIMEOUT_MS,
};
use botsso_core::domain::token::SsoTokenResponse;
use botsso_core::errors::{ApplicationError, DomainError, ExchangeError};
use botsso_core::flows::{FlowEngine, PromptEvent, PromptState, SsoPromptFlow};
use botsso_db::ConversationStateStore;
use botsso_identity::{SsoAssertion, TokenExchangeClient};

use crate::activity::{Activity, ActivityKind, TokenExchangeRequest};
use crate::audit::TracingAuditSink;
use crate::cards::{sign_in_card_activity, sign_in_resource, SignInSettings};

pub const PROMPT_COMPONENT: &str = "Teams Bot SSO Prompt";
const AUDIT_ACTOR: &str = "sso_prompt";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SsoPromptSettings {
    pub scopes: Vec<String>,
    pub timeout: Duration,
    pub end_on_invalid_message: bool,
}

impl SsoPromptSettings {
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
            timeout: Duration::from_millis(DEFAULT_PROMPT_TIMEOUT_MS),
            end_on_invalid_message: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_end_on_invalid_message(mut self, end_on_invalid_message: bool) -> Self {
        self.end_on_invalid_message = end_on_invalid_message;
        self
    }

    /// Returns the timeout once it is known to yield a representable deadline from `now`.
    fn validated_timeout(&self, now: DateTime<Utc>) -> Result<chrono::Duration, DomainError> {
        if self.scopes.is_empty() || self.scopes.iter().any(|scope| scope.trim().is_empty()) {
            return Err(DomainError::InvalidParameter(
                "scopes must contain at least one non-empty scope".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(DomainError::InvalidParameter("timeout must be positive".to_string()));
        }
        let out_of_range = || DomainError::InvalidParameter("timeout is out of range".to_string());
        let timeout = chrono::Duration::from_std(self.timeout).map_err(|_| out_of_range())?;
        now.checked_add_signed(timeout).ok_or_else(out_of_range)?;
        Ok(timeout)
    }
}

impl From<&PromptConfig> for SsoPromptSettings {
    fn from(config: &PromptConfig) -> Self {
        Self::new(config.scopes.iter().cloned())
            .with_timeout(config.timeout())
            .with_end_on_invalid_message(config.end_on_invalid_message)
    }
}

/// The protected command a sign-in was started for; stored with the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingCommand {
    pub id: String,
    pub message: CommandMessage,
}

#[derive(Clone, Debug)]
pub enum PromptStatus {
    /// No sign-in is in flight for this user.
    Inactive,
    Waiting,
    Completed(SsoTokenResponse),
    Ended(ApplicationError),
}

/// Everything one turn produced: what to send, what to answer the invoke with, and where
/// the sign-in stands. `session` is the last snapshot, already deleted from the store when
/// the status is terminal.
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    pub session: Option<DialogSession>,
    pub outbound: Vec<Activity>,
    pub invoke_response: Option<InvokeResponse>,
    pub status: PromptStatus,
}

impl TurnOutcome {
    fn inactive(activity: &Activity) -> Self {
        Self {
            session: None,
            outbound: Vec::new(),
            invoke_response: activity.is_invoke().then(InvokeResponse::ok),
            status: PromptStatus::Inactive,
        }
    }

    fn waiting(session: DialogSession, invoke_response: Option<InvokeResponse>) -> Self {
        Self {
            session: Some(session),
            outbound: Vec::new(),
            invoke_response,
            status: PromptStatus::Waiting,
        }
    }

    fn ended(
        session: DialogSession,
        invoke_response: Option<InvokeResponse>,
        error: ApplicationError,
    ) -> Self {
        Self {
            session: Some(session),
            outbound: Vec::new(),
            invoke_response,
            status: PromptStatus::Ended(error),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, PromptStatus::Completed(_) | PromptStatus::Ended(_))
    }
}

/// Drives the SSO token-exchange state machine one turn at a time. All state lives in the
/// [`ConversationStateStore`]; the prompt itself is shared across conversations.
pub struct SsoPrompt {
    store: Arc<dyn ConversationStateStore>,
    exchange: Arc<dyn TokenExchangeClient>,
    sign_in: SignInSettings,
    engine: FlowEngine<SsoPromptFlow>,
    audit: Arc<dyn AuditSink>,
}

impl SsoPrompt {
    pub fn new(
        store: Arc<dyn ConversationStateStore>,
        exchange: Arc<dyn TokenExchangeClient>,
        sign_in: SignInSettings,
    ) -> Self {
        Self {
            store,
            exchange,
            sign_in,
            engine: FlowEngine::default(),
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn store(&self) -> &Arc<dyn ConversationStateStore> {
        &self.store
    }

    /// Starts a sign-in: persists a fresh session and returns the sign-in card to send.
    pub async fn begin(
        &self,
        activity: &Activity,
        settings: &SsoPromptSettings,
        pending: Option<PendingCommand>,
    ) -> Result<TurnOutcome, ApplicationError> {
        ensure_teams_channel(activity)?;
        let now = Utc::now();
        let timeout = settings.validated_timeout(now)?;
        self.sign_in.validate()?;

        let key = activity.session_key();
        let existing = self.store.load(&key).await?;
        if let Some(current) = &existing {
            if current.is_active() && !current.is_expired_at(now) {
                return Err(DomainError::InvariantViolation(format!(
                    "an sso prompt is already active for `{}`",
                    key.storage_key()
                ))
                .into());
            }
        }

        let mut session = DialogSession::new(
            key,
            settings.scopes.clone(),
            timeout,
            settings.end_on_invalid_message,
            now,
        );
        // Replacing a stale leftover must pass the store's version check.
        session.version = existing.map(|stale| stale.version).unwrap_or(0);
        session.login_hint = activity.from.user_principal_name.clone();
        if let Some(pending) = pending {
            session.command_id = Some(pending.id);
            session.command_message = Some(pending.message);
        }

        let correlation_id = Uuid::new_v4().to_string();
        self.advance(&mut session, PromptEvent::CardSent, &correlation_id)?;
        session.pending_correlation_id = Some(correlation_id.clone());
        let card = self.sign_in_card(activity, &session, &correlation_id);
        let session = self.store.save(session).await?;

        info!(
            event_name = "sso.prompt.card_issued",
            conversation_id = %session.conversation_id(),
            correlation_id = %correlation_id,
            expires_at = %session.expires_at,
            "sign-in card issued"
        );

        Ok(TurnOutcome {
            session: Some(session),
            outbound: vec![card],
            invoke_response: None,
            status: PromptStatus::Waiting,
        })
    }

    /// Resumes the sign-in in flight for the activity's sender, if any.
    pub async fn handle_turn(&self, activity: &Activity) -> Result<TurnOutcome, ApplicationError> {
        ensure_teams_channel(activity)?;

        let key = activity.session_key();
        let Some(mut session) = self.store.load(&key).await? else {
            return Ok(TurnOutcome::inactive(activity));
        };
        if !session.is_active() {
            self.store.delete(&key).await?;
            return Ok(TurnOutcome::inactive(activity));
        }

        let now = Utc::now();
        if session.is_expired_at(now) {
            let correlation_id = session.pending_correlation_id.clone().unwrap_or_default();
            self.advance(&mut session, PromptEvent::DeadlineElapsed, &correlation_id)?;
            self.store.delete(&key).await?;
            warn!(
                event_name = "sso.prompt.timed_out",
                conversation_id = %session.conversation_id(),
                correlation_id = %correlation_id,
                "sign-in expired before a token was exchanged"
            );
            let ack = activity.is_invoke().then(InvokeResponse::ok);
            return Ok(TurnOutcome::ended(session, ack, ApplicationError::TimedOut));
        }

        match activity.kind() {
            ActivityKind::TokenExchange(request) => {
                self.handle_token_exchange(session, request, now).await
            }
            ActivityKind::VerifyState => self.handle_verify_state(activity, session).await,
            ActivityKind::Message { .. } => self.handle_message(session).await,
            ActivityKind::Other => Ok(TurnOutcome::waiting(session, None)),
        }
    }

    /// Cancels the sign-in in flight, returning its final snapshot. A no-op when nothing
    /// is active.
    pub async fn cancel(
        &self,
        key: &SessionKey,
    ) -> Result<Option<DialogSession>, ApplicationError> {
        let Some(mut session) = self.store.load(key).await? else {
            return Ok(None);
        };
        if !session.is_active() {
            self.store.delete(key).await?;
            return Ok(None);
        }

        let correlation_id = session.pending_correlation_id.clone().unwrap_or_default();
        self.advance(&mut session, PromptEvent::CancelRequested, &correlation_id)?;
        self.store.delete(key).await?;
        info!(
            event_name = "sso.prompt.cancelled",
            conversation_id = %session.conversation_id(),
            "sign-in cancelled"
        );
        Ok(Some(session))
    }

    async fn handle_token_exchange(
        &self,
        mut session: DialogSession,
        request: Option<TokenExchangeRequest>,
        now: DateTime<Utc>,
    ) -> Result<TurnOutcome, ApplicationError> {
        let Some(request) = request else {
            warn!(
                event_name = "sso.prompt.exchange_request_missing",
                conversation_id = %session.conversation_id(),
                "{MISSING_EXCHANGE_REQUEST_DETAIL}"
            );
            let response = InvokeResponse::bad_request(MISSING_EXCHANGE_REQUEST_DETAIL);
            return Ok(TurnOutcome::waiting(session, Some(response)));
        };

        if let Some(cached) = session.cached_response(&request.id).cloned() {
            debug!(
                event_name = "sso.prompt.exchange_deduplicated",
                correlation_id = %request.id,
                status = cached.status,
                "replaying response for duplicate exchange invoke"
            );
            return Ok(TurnOutcome::waiting(session, Some(cached)));
        }

        let matches_card = session.pending_correlation_id.as_deref() == Some(request.id.as_str());
        if !session.state.accepts_exchange() || !matches_card {
            warn!(
                event_name = "sso.prompt.exchange_stale",
                correlation_id = %request.id,
                state = session.state.as_str(),
                "exchange invoke does not match the card in flight"
            );
            let response = InvokeResponse::bad_request(STALE_CARD_DETAIL).with_id(&request.id);
            return Ok(TurnOutcome::waiting(session, Some(response)));
        }

        self.advance(&mut session, PromptEvent::ExchangeRequested, &request.id)?;
        let mut session = self.store.save(session).await?;

        match self.exchange_token(&request.token, &session.scopes, now).await {
            Ok(token_response) => {
                self.advance(&mut session, PromptEvent::ExchangeSucceeded, &request.id)?;
                self.store.delete(&session.key).await?;
                info!(
                    event_name = "sso.prompt.completed",
                    conversation_id = %session.conversation_id(),
                    correlation_id = %request.id,
                    "token exchanged"
                );
                Ok(TurnOutcome {
                    session: Some(session),
                    outbound: Vec::new(),
                    invoke_response: Some(InvokeResponse::ok().with_id(&request.id)),
                    status: PromptStatus::Completed(token_response),
                })
            }
            Err(error) if error.is_consent_required() => {
                self.advance(&mut session, PromptEvent::ConsentRequired, &request.id)?;
                let response = InvokeResponse::consent_required().with_id(&request.id);
                session.record_response(request.id.clone(), response.clone(), Utc::now());
                let session = self.store.save(session).await?;
                info!(
                    event_name = "sso.prompt.consent_required",
                    conversation_id = %session.conversation_id(),
                    correlation_id = %request.id,
                    "asking user for consent"
                );
                Ok(TurnOutcome::waiting(session, Some(response)))
            }
            Err(error) => {
                self.advance(&mut session, PromptEvent::ExchangeFailed, &request.id)?;
                self.store.delete(&session.key).await?;
                warn!(
                    event_name = "sso.prompt.exchange_failed",
                    conversation_id = %session.conversation_id(),
                    correlation_id = %request.id,
                    error = %error,
                    "token exchange failed"
                );
                let response =
                    InvokeResponse::internal_error(EXCHANGE_FAILED_DETAIL).with_id(&request.id);
                Ok(TurnOutcome::ended(session, Some(response), ApplicationError::Exchange(error)))
            }
        }
    }

    async fn exchange_token(
        &self,
        sso_token: &str,
        scopes: &[String],
        now: DateTime<Utc>,
    ) -> Result<SsoTokenResponse, ExchangeError> {
        let assertion = SsoAssertion::parse_fresh(sso_token, now)?;
        let exchanged = self.exchange.exchange(sso_token, scopes).await?;
        if exchanged.is_expired_at(Utc::now()) {
            return Err(ExchangeError::Service("exchanged token is already expired".to_string()));
        }

        Ok(SsoTokenResponse::new(
            sso_token,
            assertion.expires_at(),
            &exchanged,
            assertion.claims().clone(),
        ))
    }

    async fn handle_verify_state(
        &self,
        activity: &Activity,
        mut session: DialogSession,
    ) -> Result<TurnOutcome, ApplicationError> {
        if session.state != PromptState::ConsentRequired {
            debug!(
                event_name = "sso.prompt.verify_state_ignored",
                state = session.state.as_str(),
                "consent acknowledgement outside of a consent request"
            );
            return Ok(TurnOutcome::waiting(session, Some(InvokeResponse::ok())));
        }

        let correlation_id = Uuid::new_v4().to_string();
        self.advance(&mut session, PromptEvent::ConsentAcknowledged, &correlation_id)?;
        self.advance(&mut session, PromptEvent::CardSent, &correlation_id)?;
        session.pending_correlation_id = Some(correlation_id.clone());
        let card = self.sign_in_card(activity, &session, &correlation_id);
        let session = self.store.save(session).await?;

        info!(
            event_name = "sso.prompt.card_reissued",
            conversation_id = %session.conversation_id(),
            correlation_id = %correlation_id,
            "sign-in card re-issued after consent"
        );

        Ok(TurnOutcome {
            session: Some(session),
            outbound: vec![card],
            invoke_response: Some(InvokeResponse::ok()),
            status: PromptStatus::Waiting,
        })
    }

    async fn handle_message(
        &self,
        mut session: DialogSession,
    ) -> Result<TurnOutcome, ApplicationError> {
        if !session.end_on_invalid_message {
            return Ok(TurnOutcome::waiting(session, None));
        }

        let correlation_id = session.pending_correlation_id.clone().unwrap_or_default();
        self.advance(&mut session, PromptEvent::InvalidMessage, &correlation_id)?;
        self.store.delete(&session.key).await?;
        warn!(
            event_name = "sso.prompt.invalid_message",
            conversation_id = %session.conversation_id(),
            "message received while waiting for sign-in"
        );
        Ok(TurnOutcome::ended(
            session,
            None,
            ApplicationError::Cancelled("message received while waiting for sign-in".to_string()),
        ))
    }

    fn advance(
        &self,
        session: &mut DialogSession,
        event: PromptEvent,
        correlation_id: &str,
    ) -> Result<(), ApplicationError> {
        let audit = AuditContext::new(
            session.conversation_id(),
            session.user_id(),
            correlation_id,
            AUDIT_ACTOR,
        );
        let outcome = self
            .engine
            .apply_with_audit(&session.state, &event, self.audit.as_ref(), &audit)
            .map_err(DomainError::from)?;
        session.state = outcome.to;
        Ok(())
    }

    fn sign_in_card(
        &self,
        inbound: &Activity,
        session: &DialogSession,
        correlation_id: &str,
    ) -> Activity {
        let resource = sign_in_resource(
            &self.sign_in,
            &session.scopes,
            session.login_hint.as_deref(),
            correlation_id,
        );
        sign_in_card_activity(inbound, &resource)
    }
}

pub fn ensure_teams_channel(activity: &Activity) -> Result<(), ApplicationError> {
    if activity.is_teams() {
        Ok(())
    } else {
        Err(ApplicationError::channel_unsupported(PROMPT_COMPONENT, &activity.channel_id))
    }
}
