//! Webhook stats and profile analytics routes

use axum::{
    extract::{Query, State},
    Json,
};
use maxbot_profiles::{
    MonitoringAggregator, PeriodPreset, ProfileCoverage, ProfileQualityReport, WebhookStats,
};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub period: Option<String>,
}

fn aggregator(state: &AppState) -> ApiResult<&MonitoringAggregator> {
    state
        .monitoring
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("monitoring is disabled".into()))
}

/// `?period=hour|day|week|month`, defaulting to `day`
pub async fn webhook_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<WebhookStats>> {
    let monitoring = aggregator(&state)?;
    let preset = match query.period.as_deref() {
        None | Some("") => PeriodPreset::default(),
        Some(raw) => raw.parse::<PeriodPreset>()?,
    };
    let stats = monitoring
        .webhook_stats(preset.period(OffsetDateTime::now_utc()))
        .await?;
    Ok(Json(stats))
}

pub async fn coverage(State(state): State<AppState>) -> ApiResult<Json<ProfileCoverage>> {
    Ok(Json(aggregator(&state)?.coverage().await?))
}

pub async fn quality(State(state): State<AppState>) -> ApiResult<Json<ProfileQualityReport>> {
    Ok(Json(aggregator(&state)?.quality_report().await?))
}
