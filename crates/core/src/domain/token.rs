use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Delegated access token obtained on behalf of the user. Lives only for the handoff to a
/// command handler and is never written to a session.
#[derive(Clone, Debug)]
pub struct ExchangedToken {
    pub value: SecretString,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

impl ExchangedToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>, scopes: Vec<String>) -> Self {
        Self { value: SecretString::from(value.into()), expires_at, scopes }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Identity claims read from the SSO assertion. Informational only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityClaims {
    pub subject: Option<String>,
    pub object_id: Option<String>,
    pub tenant: Option<String>,
    pub preferred_username: Option<String>,
    pub display_name: Option<String>,
}

/// Success payload handed to the matched command handler.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SsoTokenResponse {
    pub sso_token: String,
    pub sso_token_expiration: String,
    pub token: String,
    pub expiration: String,
    pub claims: IdentityClaims,
}

impl SsoTokenResponse {
    pub fn new(
        sso_token: impl Into<String>,
        sso_token_expires_at: DateTime<Utc>,
        exchanged: &ExchangedToken,
        claims: IdentityClaims,
    ) -> Self {
        Self {
            sso_token: sso_token.into(),
            sso_token_expiration: iso_8601(sso_token_expires_at),
            token: exchanged.value.expose_secret().to_owned(),
            expiration: iso_8601(exchanged.expires_at),
            claims,
        }
    }
}

impl fmt::Debug for SsoTokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SsoTokenResponse")
            .field("sso_token", &"[REDACTED]")
            .field("sso_token_expiration", &self.sso_token_expiration)
            .field("token", &"[REDACTED]")
            .field("expiration", &self.expiration)
            .field("claims", &self.claims)
            .finish()
    }
}

pub fn iso_8601(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{ExchangedToken, IdentityClaims, SsoTokenResponse};

    #[test]
    fn token_response_uses_iso_8601_and_camel_case() {
        let expires_at = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).single().expect("date");
        let exchanged = ExchangedToken::new("graph-token", expires_at, vec!["User.Read".into()]);
        let response =
            SsoTokenResponse::new("sso-token", expires_at, &exchanged, IdentityClaims::default());

        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(value["ssoToken"], "sso-token");
        assert_eq!(value["token"], "graph-token");
        assert_eq!(value["expiration"], "2026-10-17T12:00:00.000Z");
        assert_eq!(value["ssoTokenExpiration"], "2026-10-17T12:00:00.000Z");
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let expires_at = Utc::now();
        let exchanged = ExchangedToken::new("graph-secret", expires_at, Vec::new());
        let response =
            SsoTokenResponse::new("sso-secret", expires_at, &exchanged, IdentityClaims::default());

        let debug = format!("{response:?} {exchanged:?}");
        assert!(!debug.contains("graph-secret"));
        assert!(!debug.contains("sso-secret"));
        assert!(exchanged.is_expired_at(expires_at));
    }
}
