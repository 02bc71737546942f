use serde::{Deserialize, Serialize};

pub const CONSENT_REQUIRED_DETAIL: &str =
    "The bot is unable to exchange token. Ask for user consent.";
pub const MISSING_EXCHANGE_REQUEST_DETAIL: &str = "The bot received an InvokeActivity that is missing a TokenExchangeInvokeRequest value. This is required to be sent with the InvokeActivity.";
pub const STALE_CARD_DETAIL: &str =
    "The token exchange request does not match the sign-in card in flight.";
pub const EXCHANGE_FAILED_DETAIL: &str = "The bot failed to exchange token.";

/// Synchronous acknowledgement returned to the transport for an invoke activity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub status: u16,
    pub body: InvokeResponseBody,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResponseBody {
    /// Echo of the exchange request id, when answering a `signin/tokenExchange`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<String>,
}

impl InvokeResponse {
    pub fn ok() -> Self {
        Self { status: 200, body: InvokeResponseBody::default() }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::with_detail(400, detail)
    }

    pub fn precondition_failed(detail: impl Into<String>) -> Self {
        Self::with_detail(412, detail)
    }

    pub fn internal_error(detail: impl Into<String>) -> Self {
        Self::with_detail(500, detail)
    }

    pub fn consent_required() -> Self {
        Self::precondition_failed(CONSENT_REQUIRED_DETAIL)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.body.id = Some(id.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    fn with_detail(status: u16, detail: impl Into<String>) -> Self {
        Self { status, body: InvokeResponseBody { id: None, failure_detail: Some(detail.into()) } }
    }
}
