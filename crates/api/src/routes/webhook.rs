//! Platform webhook receiver
//!
//! Every request is answered `200 {"status":"ok"}` so the platform never
//! retries; problems are logged and counted in webhook stats instead.

use axum::{body::Bytes, extract::State, Json};
use maxbot_profiles::WebhookEvent;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn receive(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    match serde_json::from_slice::<WebhookEvent>(&body) {
        Ok(event) => {
            let metric = state.ingestor.handle(&event).await;
            tracing::debug!(
                event_type = %metric.event_type,
                user_id = %metric.user_id,
                success = metric.success,
                processing_time_ms = metric.processing_time_ms,
                "Webhook event handled"
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, body_len = body.len(), "Malformed webhook payload");
        }
    }
    Json(json!({ "status": "ok" }))
}
