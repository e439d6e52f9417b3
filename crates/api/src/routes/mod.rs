//! HTTP routes

pub mod monitoring;
pub mod phones;
pub mod profiles;
#[cfg(test)]
mod route_tests;
pub mod webhook;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use maxbot_profiles::{CircuitSnapshot, CircuitState};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub cache_backend: &'static str,
    pub circuit: CircuitSnapshot,
    pub monitoring_enabled: bool,
}

/// Liveness plus cache circuit state; `degraded` while the circuit is open
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let circuit = state.breaker.snapshot();
    let status = match circuit.state {
        CircuitState::Open => "degraded",
        CircuitState::Closed | CircuitState::HalfOpen => "ok",
    };
    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        cache_backend: state.config.cache_backend.as_str(),
        circuit,
        monitoring_enabled: state.monitoring.is_some(),
    })
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/webhook/max", post(webhook::receive))
        .route("/profiles/stats", get(profiles::stats))
        .route(
            "/profiles/{user_id}",
            get(profiles::get_profile).put(profiles::update_profile),
        )
        .route("/profiles/{user_id}/name", post(profiles::set_name))
        .route("/profiles/{user_id}/request-name", post(profiles::request_name))
        .route("/monitoring/webhook/stats", get(monitoring::webhook_stats))
        .route("/monitoring/profiles/coverage", get(monitoring::coverage))
        .route("/monitoring/profiles/quality", get(monitoring::quality))
        .route("/users/batch-by-phone", post(phones::batch_by_phone))
        .route("/users/by-phone", get(phones::user_id_by_phone))
        .route("/users/by-phone/profile", get(phones::profile_by_phone))
        .route("/phones/validate", post(phones::validate));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .with_state(state)
}
