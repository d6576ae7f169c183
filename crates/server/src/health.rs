use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use mailvoice_agent::Orchestrator;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    orchestrator: Arc<Orchestrator>,
    recognizer: &'static str,
}

impl HealthState {
    pub fn new(orchestrator: Arc<Orchestrator>, recognizer: &'static str) -> Self {
        Self { orchestrator, recognizer }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CallsSummary {
    pub active: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub recognizer: HealthCheck,
    pub calls: CallsSummary,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "mailvoice-server accepting calls".to_string(),
        },
        recognizer: HealthCheck {
            status: "ready",
            detail: format!("intent recognition via `{}`", state.recognizer),
        },
        calls: CallsSummary { active: state.orchestrator.active_call_count() },
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}
