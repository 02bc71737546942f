use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use botsso_db::{ping, DbPool};
use chrono::Utc;
use serde::Serialize;

/// What `/health` probes to decide whether conversation state can be read and written.
#[derive(Clone)]
pub enum StoreProbe {
    Memory,
    Sql(DbPool),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub store: HealthCheck,
    pub checked_at: String,
}

pub fn router(probe: StoreProbe) -> Router {
    Router::new().route("/health", get(health)).with_state(probe)
}

pub async fn health(State(probe): State<StoreProbe>) -> (StatusCode, Json<HealthResponse>) {
    let store = store_check(&probe).await;
    let ready = store.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "botsso-server runtime initialized".to_string(),
        },
        store,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn store_check(probe: &StoreProbe) -> HealthCheck {
    match probe {
        StoreProbe::Memory => {
            HealthCheck { status: "ready", detail: "in-memory conversation store".to_string() }
        }
        StoreProbe::Sql(pool) => match ping(pool).await {
            Ok(()) => {
                HealthCheck { status: "ready", detail: "database query succeeded".to_string() }
            }
            Err(error) => HealthCheck {
                status: "degraded",
                detail: format!("database query failed: {error}"),
            },
        },
    }
}
