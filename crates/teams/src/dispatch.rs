use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{error, info, warn};

use botsso_core::domain::invoke::InvokeResponse;
use botsso_core::domain::session::CommandMessage;
use botsso_core::domain::token::SsoTokenResponse;
use botsso_core::errors::{ApplicationError, DomainError, FAILED_TO_RETRIEVE_SSO_TOKEN};

use crate::activity::{Activity, ActivityKind};
use crate::prompt::{PendingCommand, PromptStatus, SsoPrompt, SsoPromptSettings, TurnOutcome};

pub const DISPATCH_COMPONENT: &str = "SSO execution dialog";

/// What a plain message must look like to start a protected command.
#[derive(Clone, Debug)]
pub enum TriggerPattern {
    /// Case-insensitive equality with the normalized message text.
    Exact(String),
    Regex(Regex),
}

impl TriggerPattern {
    pub fn exact(text: impl Into<String>) -> Self {
        Self::Exact(text.into())
    }

    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self::Regex)
    }

    pub fn source(&self) -> &str {
        match self {
            Self::Exact(text) => text,
            Self::Regex(regex) => regex.as_str(),
        }
    }

    /// Returns the captured groups (whole match first) when `text` triggers the pattern.
    pub fn captures(&self, text: &str) -> Option<Vec<String>> {
        if text.is_empty() {
            return None;
        }
        match self {
            Self::Exact(expected) => {
                (expected.trim().to_lowercase() == text).then(|| vec![text.to_string()])
            }
            Self::Regex(regex) => regex.captures(text).map(|captures| {
                captures
                    .iter()
                    .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect()
            }),
        }
    }
}

impl PartialEq for TriggerPattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(left), Self::Exact(right)) => left == right,
            (Self::Regex(left), Self::Regex(right)) => left.as_str() == right.as_str(),
            _ => false,
        }
    }
}

/// Stable id for a command: the alphanumerics of its joined patterns followed by their
/// SHA-256 digest.
pub fn command_id(patterns: &[TriggerPattern]) -> String {
    let joined = patterns.iter().map(TriggerPattern::source).collect::<Vec<_>>().join(",");
    let readable: String = joined.chars().filter(char::is_ascii_alphanumeric).collect();
    format!("{readable}{:x}", Sha256::digest(joined.as_bytes()))
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Business logic run once a delegated token is available.
#[async_trait]
pub trait SsoCommandHandler: Send + Sync {
    /// Returns the text to reply with, if any.
    async fn handle(
        &self,
        activity: &Activity,
        token: &SsoTokenResponse,
        message: &CommandMessage,
    ) -> Result<Option<String>, HandlerError>;
}

struct RegisteredCommand {
    id: String,
    triggers: Vec<TriggerPattern>,
    handler: Arc<dyn SsoCommandHandler>,
    settings: SsoPromptSettings,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub invoke_response: Option<InvokeResponse>,
    pub activities: Vec<Activity>,
}

impl DispatchOutcome {
    fn reply(inbound: &Activity, text: impl Into<String>) -> Self {
        Self {
            invoke_response: None,
            activities: vec![Activity::message(text).reply_to(inbound)],
        }
    }

    pub fn reply_texts(&self) -> Vec<&str> {
        self.activities.iter().filter_map(|activity| activity.text.as_deref()).collect()
    }
}

/// Routes plain messages to registered commands and runs each one behind an SSO prompt.
/// One instance per deployment; commands register before the first turn.
pub struct CommandDispatchDialog {
    prompt: SsoPrompt,
    default_settings: SsoPromptSettings,
    commands: Vec<RegisteredCommand>,
}

impl CommandDispatchDialog {
    pub fn new(prompt: SsoPrompt, default_settings: SsoPromptSettings) -> Self {
        Self { prompt, default_settings, commands: Vec::new() }
    }

    pub fn prompt(&self) -> &SsoPrompt {
        &self.prompt
    }

    pub fn add_command<H>(
        &mut self,
        handler: H,
        triggers: Vec<TriggerPattern>,
    ) -> Result<String, DomainError>
    where
        H: SsoCommandHandler + 'static,
    {
        let settings = self.default_settings.clone();
        self.add_command_with_settings(handler, triggers, settings)
    }

    pub fn add_command_with_settings<H>(
        &mut self,
        handler: H,
        triggers: Vec<TriggerPattern>,
        settings: SsoPromptSettings,
    ) -> Result<String, DomainError>
    where
        H: SsoCommandHandler + 'static,
    {
        if triggers.is_empty() {
            return Err(DomainError::InvalidParameter(
                "a command needs at least one trigger pattern".to_string(),
            ));
        }

        let id = command_id(&triggers);
        if self.commands.iter().any(|command| command.id == id) {
            return Err(DomainError::InvalidParameter(format!(
                "a command with trigger patterns `{}` is already registered",
                triggers.iter().map(TriggerPattern::source).collect::<Vec<_>>().join(", ")
            )));
        }

        self.commands.push(RegisteredCommand {
            id: id.clone(),
            triggers,
            handler: Arc::new(handler),
            settings,
        });
        Ok(id)
    }

    pub fn command_ids(&self) -> Vec<&str> {
        self.commands.iter().map(|command| command.id.as_str()).collect()
    }

    /// Processes one inbound activity.
    pub async fn run(&self, activity: &Activity) -> Result<DispatchOutcome, ApplicationError> {
        if !activity.is_teams() {
            return Err(ApplicationError::channel_unsupported(
                DISPATCH_COMPONENT,
                &activity.channel_id,
            ));
        }

        let outcome = self.prompt.handle_turn(activity).await?;
        match outcome.status {
            PromptStatus::Inactive => match activity.kind() {
                ActivityKind::Message { .. } => self.route(activity).await,
                _ => Ok(DispatchOutcome {
                    invoke_response: outcome.invoke_response,
                    activities: Vec::new(),
                }),
            },
            PromptStatus::Waiting => Ok(DispatchOutcome {
                invoke_response: outcome.invoke_response,
                activities: outcome.outbound,
            }),
            PromptStatus::Completed(ref token) => {
                let mut dispatched = self.complete(activity, &outcome, token).await;
                dispatched.invoke_response = outcome.invoke_response.clone();
                Ok(dispatched)
            }
            PromptStatus::Ended(ref failure) => {
                warn!(
                    event_name = "sso.dispatch.sign_in_failed",
                    conversation_id = %activity.conversation.id,
                    error = %failure,
                    "{FAILED_TO_RETRIEVE_SSO_TOKEN}"
                );
                let mut dispatched = DispatchOutcome::reply(activity, failure.user_message());
                dispatched.invoke_response = outcome.invoke_response.clone();
                Ok(dispatched)
            }
        }
    }

    async fn route(&self, activity: &Activity) -> Result<DispatchOutcome, ApplicationError> {
        let text = activity.normalized_text();
        let matched = self.commands.iter().find_map(|command| {
            command
                .triggers
                .iter()
                .find_map(|trigger| trigger.captures(&text))
                .map(|matches| (command, matches))
        });

        let Some((command, matches)) = matched else {
            let raw = activity.text.clone().unwrap_or_default();
            warn!(
                event_name = "sso.dispatch.command_not_found",
                conversation_id = %activity.conversation.id,
                text = %raw,
                "no command matched"
            );
            return Ok(DispatchOutcome::reply(activity, format!("Cannot find command: {raw}")));
        };

        info!(
            event_name = "sso.dispatch.command_matched",
            conversation_id = %activity.conversation.id,
            command_id = %command.id,
            "starting sign-in for command"
        );
        let pending = PendingCommand {
            id: command.id.clone(),
            message: CommandMessage { text, matches },
        };
        let outcome = self.prompt.begin(activity, &command.settings, Some(pending)).await?;
        Ok(DispatchOutcome { invoke_response: None, activities: outcome.outbound })
    }

    async fn complete(
        &self,
        activity: &Activity,
        outcome: &TurnOutcome,
        token: &SsoTokenResponse,
    ) -> DispatchOutcome {
        let session = outcome.session.as_ref();
        let command_id = session.and_then(|session| session.command_id.as_deref());
        let message =
            session.and_then(|session| session.command_message.clone()).unwrap_or_default();

        let Some(command) =
            command_id.and_then(|id| self.commands.iter().find(|command| command.id == id))
        else {
            warn!(
                event_name = "sso.dispatch.command_missing",
                command_id = command_id.unwrap_or_default(),
                "sign-in completed for a command that is no longer registered"
            );
            let reply = format!("Cannot find command: {}", message.text);
            return DispatchOutcome::reply(activity, reply);
        };

        match command.handler.handle(activity, token, &message).await {
            Ok(Some(reply)) => DispatchOutcome::reply(activity, reply),
            Ok(None) => DispatchOutcome::default(),
            Err(failure) => {
                error!(
                    event_name = "sso.dispatch.handler_failed",
                    command_id = %command.id,
                    error = %failure,
                    "sso command handler failed"
                );
                let reply = format!("Failed to process SSO handler: {failure}");
                DispatchOutcome::reply(activity, reply)
            }
        }
    }
}
