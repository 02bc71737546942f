use thiserror::Error;

use crate::audit::{AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{PromptAction, PromptEvent, PromptState, TransitionOutcome};

pub trait FlowDefinition {
    fn flow_name(&self) -> &'static str;
    fn initial_state(&self) -> PromptState;
    fn transition(
        &self,
        current: &PromptState,
        event: &PromptEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct SsoPromptFlow;

impl FlowDefinition for SsoPromptFlow {
    fn flow_name(&self) -> &'static str {
        "sso_prompt"
    }

    fn initial_state(&self) -> PromptState {
        PromptState::Idle
    }

    fn transition(
        &self,
        current: &PromptState,
        event: &PromptEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_sso_prompt(current, event)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_name(&self) -> &'static str {
        self.flow.flow_name()
    }

    pub fn initial_state(&self) -> PromptState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &PromptState,
        event: &PromptEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &PromptState,
        event: &PromptEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::transition(audit, AuditOutcome::Applied)
                        .with_metadata("from", outcome.from.as_str())
                        .with_metadata("to", outcome.to.as_str())
                        .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::transition(audit, AuditOutcome::Rejected)
                        .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<SsoPromptFlow> {
    fn default() -> Self {
        Self::new(SsoPromptFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: PromptState, event: PromptEvent },
}

fn transition_sso_prompt(
    current: &PromptState,
    event: &PromptEvent,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use PromptAction::{
        DiscardSession, ExchangeToken, ReleaseToken, RespondPreconditionFailed, SendSignInCard,
    };
    use PromptEvent::{
        CancelRequested, CardSent, ConsentAcknowledged, ConsentRequired, DeadlineElapsed,
        ExchangeFailed, ExchangeRequested, ExchangeSucceeded, InvalidMessage,
    };
    use PromptState::{AwaitingConsentAck, AwaitingExchange, CardIssued, Idle};

    let (to, actions) = match (current, event) {
        (Idle, CardSent) | (AwaitingConsentAck, CardSent) => (CardIssued, vec![SendSignInCard]),
        (CardIssued, ExchangeRequested) | (AwaitingExchange, ExchangeRequested) => {
            (AwaitingExchange, vec![ExchangeToken])
        }
        (AwaitingExchange, ExchangeSucceeded) => {
            (PromptState::Completed, vec![ReleaseToken, DiscardSession])
        }
        (AwaitingExchange, ConsentRequired) => {
            (PromptState::ConsentRequired, vec![RespondPreconditionFailed])
        }
        (AwaitingExchange, ExchangeFailed) => (PromptState::Failed, vec![DiscardSession]),
        (PromptState::ConsentRequired, ConsentAcknowledged) => (AwaitingConsentAck, Vec::new()),
        (state, DeadlineElapsed) if state.is_active() => {
            (PromptState::TimedOut, vec![DiscardSession])
        }
        (state, InvalidMessage) | (state, CancelRequested) if state.is_active() => {
            (PromptState::Cancelled, vec![DiscardSession])
        }
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}
