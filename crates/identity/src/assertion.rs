use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use botsso_core::domain::token::IdentityClaims;
use botsso_core::errors::ExchangeError;

/// The short-lived identity token Teams delivers in a `signin/tokenExchange` invoke.
///
/// Only the shape and the `exp` claim are checked here. Signature validation belongs to
/// the identity provider, which rejects a forged assertion during the exchange.
#[derive(Clone)]
pub struct SsoAssertion {
    raw: String,
    expires_at: DateTime<Utc>,
    claims: IdentityClaims,
}

#[derive(Debug, Deserialize)]
struct AssertionPayload {
    exp: Option<f64>,
    sub: Option<String>,
    oid: Option<String>,
    tid: Option<String>,
    preferred_username: Option<String>,
    name: Option<String>,
}

impl SsoAssertion {
    pub fn parse(raw: &str) -> Result<Self, ExchangeError> {
        let raw = raw.trim();
        let segments: Vec<&str> = raw.split('.').collect();
        if segments.len() != 3 {
            return Err(ExchangeError::InvalidAssertion(format!(
                "expected 3 dot-separated segments, found {}",
                segments.len()
            )));
        }
        if segments[0].is_empty() || segments[1].is_empty() {
            return Err(ExchangeError::InvalidAssertion(
                "header and payload segments must not be empty".to_string(),
            ));
        }

        let payload_bytes = URL_SAFE_NO_PAD.decode(segments[1].trim_end_matches('=')).map_err(
            |error| ExchangeError::InvalidAssertion(format!("payload is not base64url: {error}")),
        )?;
        let payload: AssertionPayload = serde_json::from_slice(&payload_bytes).map_err(|error| {
            ExchangeError::InvalidAssertion(format!("payload is not a JSON claim set: {error}"))
        })?;

        let exp = payload
            .exp
            .ok_or_else(|| ExchangeError::InvalidAssertion("missing `exp` claim".to_string()))?;
        let expires_at = DateTime::from_timestamp(exp.trunc() as i64, 0).ok_or_else(|| {
            ExchangeError::InvalidAssertion(format!("`exp` claim {exp} is out of range"))
        })?;

        Ok(Self {
            raw: raw.to_string(),
            expires_at,
            claims: IdentityClaims {
                subject: payload.sub,
                object_id: payload.oid,
                tenant: payload.tid,
                preferred_username: payload.preferred_username,
                display_name: payload.name,
            },
        })
    }

    /// Parses and rejects assertions already past their `exp`.
    pub fn parse_fresh(raw: &str, now: DateTime<Utc>) -> Result<Self, ExchangeError> {
        let assertion = Self::parse(raw)?;
        assertion.ensure_fresh(now)?;
        Ok(assertion)
    }

    pub fn ensure_fresh(&self, now: DateTime<Utc>) -> Result<(), ExchangeError> {
        if self.is_expired_at(now) {
            return Err(ExchangeError::AssertionExpired);
        }
        Ok(())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn claims(&self) -> &IdentityClaims {
        &self.claims
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Debug for SsoAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SsoAssertion")
            .field("raw", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("claims", &self.claims)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use serde_json::Value;

    pub fn unsigned_token(payload: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{body}.signature")
    }
}
