use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use botsso_core::domain::invoke::InvokeResponse;
use botsso_core::errors::{ApplicationError, DomainError};
use botsso_teams::{Activity, CommandDispatchDialog, DispatchOutcome};
use serde::Serialize;
use tracing::{error, warn};

#[derive(Clone)]
pub struct MessagesState {
    dialog: Arc<CommandDispatchDialog>,
}

/// Everything the bot wants the channel to do for one inbound activity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoke_response: Option<InvokeResponse>,
    pub activities: Vec<Activity>,
}

impl From<DispatchOutcome> for TurnResponse {
    fn from(outcome: DispatchOutcome) -> Self {
        Self { invoke_response: outcome.invoke_response, activities: outcome.activities }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: &'static str,
}

pub fn router(dialog: Arc<CommandDispatchDialog>) -> Router {
    Router::new()
        .route("/api/messages", post(receive_activity))
        .with_state(MessagesState { dialog })
}

async fn receive_activity(
    State(state): State<MessagesState>,
    Json(activity): Json<Activity>,
) -> Response {
    match state.dialog.run(&activity).await {
        Ok(outcome) => (StatusCode::OK, Json(TurnResponse::from(outcome))).into_response(),
        Err(failure) => {
            let status = status_for(&failure);
            if status.is_server_error() {
                error!(
                    event_name = "botsso.messages.turn_failed",
                    conversation_id = %activity.conversation.id,
                    error = %failure,
                    "activity could not be processed"
                );
            } else {
                warn!(
                    event_name = "botsso.messages.turn_rejected",
                    conversation_id = %activity.conversation.id,
                    channel_id = %activity.channel_id,
                    error = %failure,
                    "activity rejected"
                );
            }
            let body =
                ErrorResponse { error: failure.to_string(), message: failure.user_message() };
            (status, Json(body)).into_response()
        }
    }
}

fn status_for(failure: &ApplicationError) -> StatusCode {
    match failure {
        ApplicationError::ChannelUnsupported { .. }
        | ApplicationError::Domain(DomainError::InvalidParameter(_)) => StatusCode::BAD_REQUEST,
        ApplicationError::Domain(_) => StatusCode::CONFLICT,
        ApplicationError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
        ApplicationError::Exchange(_)
        | ApplicationError::TimedOut
        | ApplicationError::Cancelled(_)
        | ApplicationError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
