use serde::Serialize;

use botsso_core::config::AuthConfig;
use botsso_core::errors::ApplicationError;

use crate::activity::{Activity, Attachment};

pub const OAUTH_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.oauth";
pub const SIGN_IN_CARD_TEXT: &str = "Teams SSO Sign In";
pub const SIGN_IN_BUTTON_TITLE: &str = "Sign In";

/// App registration values needed to render a sign-in card.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignInSettings {
    pub initiate_login_endpoint: String,
    pub client_id: String,
    pub tenant_id: String,
    pub application_id_uri: String,
}

impl From<&AuthConfig> for SignInSettings {
    fn from(config: &AuthConfig) -> Self {
        Self {
            initiate_login_endpoint: config.initiate_login_endpoint.clone(),
            client_id: config.client_id.clone(),
            tenant_id: config.tenant_id.clone(),
            application_id_uri: config.application_id_uri.clone(),
        }
    }
}

impl SignInSettings {
    pub fn validate(&self) -> Result<(), ApplicationError> {
        let missing: Vec<&str> = [
            ("initiateLoginEndpoint", &self.initiate_login_endpoint),
            ("clientId", &self.client_id),
            ("tenantId", &self.tenant_id),
            ("applicationIdUri", &self.application_id_uri),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ApplicationError::Configuration(format!(
                "sign-in settings are missing: {}",
                missing.join(", ")
            )))
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TokenExchangeResource {
    pub id: String,
    pub uri: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignInResource {
    pub sign_in_link: String,
    pub token_exchange_resource: TokenExchangeResource,
    pub scopes: String,
    pub client_id: String,
    pub tenant_id: String,
    pub login_hint: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CardAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub title: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthCard {
    pub text: String,
    pub connection_name: String,
    pub buttons: Vec<CardAction>,
    pub token_exchange_resource: TokenExchangeResource,
}

pub fn sign_in_resource(
    settings: &SignInSettings,
    scopes: &[String],
    login_hint: Option<&str>,
    correlation_id: impl Into<String>,
) -> SignInResource {
    let joined_scopes = scopes.join(" ");
    let mut sign_in_link = format!(
        "{}?scope={}&clientId={}&tenantId={}",
        settings.initiate_login_endpoint,
        urlencoding::encode(&joined_scopes),
        settings.client_id,
        settings.tenant_id
    );
    if let Some(hint) = login_hint.filter(|hint| !hint.is_empty()) {
        sign_in_link.push_str("&loginHint=");
        sign_in_link.push_str(&urlencoding::encode(hint));
    }

    SignInResource {
        sign_in_link,
        token_exchange_resource: TokenExchangeResource {
            id: correlation_id.into(),
            uri: format!("{}/access_as_user", settings.application_id_uri.trim_end_matches('/')),
        },
        scopes: joined_scopes,
        client_id: settings.client_id.clone(),
        tenant_id: settings.tenant_id.clone(),
        login_hint: login_hint.map(str::to_string),
    }
}

pub fn oauth_card(resource: &SignInResource) -> OAuthCard {
    OAuthCard {
        text: SIGN_IN_CARD_TEXT.to_string(),
        connection_name: String::new(),
        buttons: vec![CardAction {
            action_type: "signin".to_string(),
            title: SIGN_IN_BUTTON_TITLE.to_string(),
            value: resource.sign_in_link.clone(),
        }],
        token_exchange_resource: resource.token_exchange_resource.clone(),
    }
}

pub fn oauth_card_attachment(resource: &SignInResource) -> Attachment {
    Attachment {
        content_type: OAUTH_CARD_CONTENT_TYPE.to_string(),
        content: serde_json::to_value(oauth_card(resource)).unwrap_or_default(),
    }
}

/// Message activity carrying the sign-in card, addressed back to `inbound`.
pub fn sign_in_card_activity(inbound: &Activity, resource: &SignInResource) -> Activity {
    Activity { text: None, ..Activity::message("") }
        .with_attachment(oauth_card_attachment(resource))
        .reply_to(inbound)
}
