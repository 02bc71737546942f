use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use botsso_core::config::AuthConfig;
use botsso_core::domain::token::ExchangedToken;
use botsso_core::errors::ExchangeError;

use crate::assertion::SsoAssertion;

pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

const CONSENT_REQUIRED_CODE: u64 = 65001;
const ASSERTION_EXPIRED_CODE: u64 = 500133;
const INVALID_ASSERTION_CODE: u64 = 50013;

/// Trades an SSO assertion for a delegated access token covering `scopes`.
#[async_trait]
pub trait TokenExchangeClient: Send + Sync {
    async fn exchange(
        &self,
        sso_token: &str,
        scopes: &[String],
    ) -> Result<ExchangedToken, ExchangeError>;
}

#[derive(Clone, Debug)]
pub struct OnBehalfOfSettings {
    pub client_id: String,
    pub client_secret: SecretString,
    pub tenant_id: String,
    pub authority_host: String,
    pub request_timeout: Duration,
}

impl From<&AuthConfig> for OnBehalfOfSettings {
    fn from(config: &AuthConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            tenant_id: config.tenant_id.clone(),
            authority_host: config.authority_host.clone(),
            request_timeout: Duration::from_secs(config.exchange_timeout_secs),
        }
    }
}

/// OAuth 2.0 on-behalf-of grant against the Microsoft identity platform.
pub struct OnBehalfOfClient {
    settings: OnBehalfOfSettings,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    scope: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
    #[serde(default)]
    error_codes: Vec<u64>,
}

impl OnBehalfOfClient {
    pub fn new(settings: OnBehalfOfSettings) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|error| ExchangeError::Service(format!("http client setup failed: {error}")))?;
        Ok(Self { settings, client })
    }

    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.settings.authority_host.trim_end_matches('/'),
            self.settings.tenant_id
        )
    }
}

#[async_trait]
impl TokenExchangeClient for OnBehalfOfClient {
    async fn exchange(
        &self,
        sso_token: &str,
        scopes: &[String],
    ) -> Result<ExchangedToken, ExchangeError> {
        let assertion = SsoAssertion::parse_fresh(sso_token, Utc::now())?;
        let scope = scopes.join(" ");
        let endpoint = self.token_endpoint();

        debug!(
            event_name = "identity.obo.request",
            endpoint = %endpoint,
            scope = %scope,
            "requesting delegated token"
        );

        let response = self
            .client
            .post(&endpoint)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT_TYPE),
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.expose_secret()),
                ("assertion", assertion.as_str()),
                ("scope", scope.as_str()),
                ("requested_token_use", "on_behalf_of"),
            ])
            .send()
            .await
            .map_err(|error| {
                warn!(
                    event_name = "identity.obo.transport_error",
                    error = %error,
                    "token request failed"
                );
                ExchangeError::Service(format!("token request failed: {error}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = classify_failure(status, &body);
            warn!(
                event_name = "identity.obo.rejected",
                status = status.as_u16(),
                error = %error,
                "identity provider rejected on-behalf-of grant"
            );
            return Err(error);
        }

        let token: TokenResponse = response.json().await.map_err(|error| {
            ExchangeError::Service(format!("failed to decode token response: {error}"))
        })?;
        if token.access_token.is_empty() {
            return Err(ExchangeError::Service(
                "token endpoint returned empty access token".to_string(),
            ));
        }

        let granted_scopes = token
            .scope
            .as_deref()
            .map(|value| value.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|granted| !granted.is_empty())
            .unwrap_or_else(|| scopes.to_vec());
        let expires_at = Utc::now() + chrono::Duration::seconds(token.expires_in.unwrap_or(3600));

        debug!(
            event_name = "identity.obo.granted",
            expires_at = %expires_at,
            "delegated token granted"
        );
        Ok(ExchangedToken::new(token.access_token, expires_at, granted_scopes))
    }
}

/// Maps an error response from the token endpoint onto [`ExchangeError`].
pub fn classify_failure(status: StatusCode, body: &str) -> ExchangeError {
    if status.is_server_error() {
        return ExchangeError::Service(format!("identity provider returned {status}"));
    }

    let parsed: ProviderError = serde_json::from_str(body).unwrap_or_default();
    let has_code = |code: u64| {
        parsed.error_codes.contains(&code)
            || parsed.error_description.contains(&format!("AADSTS{code}:"))
            || parsed.error_description.contains(&format!("AADSTS{code} "))
    };
    let detail = if parsed.error_description.is_empty() {
        parsed.error.clone()
    } else {
        parsed.error_description.clone()
    };

    if parsed.error == "interaction_required"
        || parsed.error == "consent_required"
        || has_code(CONSENT_REQUIRED_CODE)
    {
        return ExchangeError::ConsentRequired(detail);
    }
    if has_code(ASSERTION_EXPIRED_CODE) {
        return ExchangeError::AssertionExpired;
    }
    if has_code(INVALID_ASSERTION_CODE) {
        return ExchangeError::InvalidAssertion(detail);
    }

    if parsed.error.is_empty() {
        ExchangeError::Service(format!("identity provider returned {status}"))
    } else {
        ExchangeError::Service(format!("identity provider returned {status}: {}", parsed.error))
    }
}
