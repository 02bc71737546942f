use async_trait::async_trait;
use botsso_core::domain::session::CommandMessage;
use botsso_core::domain::token::SsoTokenResponse;
use botsso_teams::{Activity, HandlerError, SsoCommandHandler, TriggerPattern};
use tracing::info;

/// Built-in command that proves the sign-in worked by echoing who the token belongs to.
#[derive(Clone, Debug, Default)]
pub struct ShowProfileCommand;

impl ShowProfileCommand {
    pub fn triggers() -> Vec<TriggerPattern> {
        vec![TriggerPattern::exact("show profile")]
    }
}

#[async_trait]
impl SsoCommandHandler for ShowProfileCommand {
    async fn handle(
        &self,
        activity: &Activity,
        token: &SsoTokenResponse,
        _message: &CommandMessage,
    ) -> Result<Option<String>, HandlerError> {
        let claims = &token.claims;
        let who = claims
            .display_name
            .as_deref()
            .or(claims.preferred_username.as_deref())
            .or(activity.from.name.as_deref())
            .ok_or_else(|| HandlerError::from("the sso token carries no user name"))?;

        info!(
            event_name = "botsso.command.show_profile",
            conversation_id = %activity.conversation.id,
            "profile requested"
        );

        let mut reply = format!("Signed in as {who}");
        if let Some(username) = claims.preferred_username.as_deref().filter(|name| *name != who) {
            reply.push_str(&format!(" ({username})"));
        }
        reply.push_str(&format!(". Delegated access expires at {}.", token.expiration));
        Ok(Some(reply))
    }
}

#[cfg(test)]
mod tests {
    use botsso_core::domain::session::CommandMessage;
    use botsso_core::domain::token::{ExchangedToken, IdentityClaims, SsoTokenResponse};
    use botsso_teams::{Activity, SsoCommandHandler};
    use chrono::{TimeZone, Utc};

    use super::ShowProfileCommand;

    fn token(claims: IdentityClaims) -> SsoTokenResponse {
        let expires_at = Utc.with_ymd_and_hms(2026, 10, 17, 13, 0, 0).single().expect("date");
        let exchanged = ExchangedToken::new("graph-token", expires_at, vec!["User.Read".into()]);
        SsoTokenResponse::new("sso-token", expires_at, &exchanged, claims)
    }

    #[tokio::test]
    async fn replies_with_name_and_expiry() {
        let claims = IdentityClaims {
            display_name: Some("Alice".into()),
            preferred_username: Some("alice@contoso.com".into()),
            ..IdentityClaims::default()
        };
        let reply = ShowProfileCommand
            .handle(&Activity::message("show profile"), &token(claims), &CommandMessage::default())
            .await
            .expect("handled");

        assert_eq!(
            reply.as_deref(),
            Some(
                "Signed in as Alice (alice@contoso.com). \
                 Delegated access expires at 2026-10-17T13:00:00.000Z."
            )
        );
    }

    #[tokio::test]
    async fn fails_without_any_user_name() {
        let error = ShowProfileCommand
            .handle(
                &Activity::message("show profile"),
                &token(IdentityClaims::default()),
                &CommandMessage::default(),
            )
            .await
            .expect_err("no name");
        assert_eq!(error.to_string(), "the sso token carries no user name");
    }
}
