//! Profile management routes

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use maxbot_profiles::{NameRequestOutcome, Profile, ProfileSource, ProfileStats, ProfileUpdates};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub profile: Profile,
    pub display_name: String,
    pub has_full_name: bool,
}

impl From<Profile> for ProfileResponse {
    fn from(profile: Profile) -> Self {
        Self {
            display_name: profile.display_name(),
            has_full_name: profile.has_full_name(),
            profile,
        }
    }
}

/// Source arrives as a string so an unknown value is a 400, not a body rejection
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub platform_first_name: Option<String>,
    pub platform_last_name: Option<String>,
    pub user_provided_name: Option<String>,
    pub source: Option<String>,
}

impl TryFrom<UpdateProfileRequest> for ProfileUpdates {
    type Error = ApiError;

    fn try_from(req: UpdateProfileRequest) -> Result<Self, Self::Error> {
        let source = req
            .source
            .as_deref()
            .map(str::parse::<ProfileSource>)
            .transpose()?;
        Ok(ProfileUpdates {
            platform_first_name: req.platform_first_name,
            platform_last_name: req.platform_last_name,
            user_provided_name: req.user_provided_name,
            source,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SetNameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RequestNameRequest {
    pub chat_id: i64,
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<ProfileResponse>> {
    let profile = state.manager.get_profile(&user_id).await?;
    Ok(Json(profile.into()))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> ApiResult<Json<ProfileResponse>> {
    let Json(req) = payload?;
    let updates = ProfileUpdates::try_from(req)?;
    let profile = state.manager.update_profile(&user_id, &updates).await?;
    Ok(Json(profile.into()))
}

pub async fn set_name(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<SetNameRequest>, JsonRejection>,
) -> ApiResult<Json<ProfileResponse>> {
    let Json(req) = payload?;
    let profile = state
        .manager
        .set_user_provided_name(&user_id, &req.name)
        .await?;
    Ok(Json(profile.into()))
}

pub async fn request_name(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<RequestNameRequest>, JsonRejection>,
) -> ApiResult<Json<NameRequestOutcome>> {
    let Json(req) = payload?;
    let outcome = state.manager.request_name(&user_id, req.chat_id).await?;
    Ok(Json(outcome))
}

pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<ProfileStats>> {
    Ok(Json(state.manager.stats().await?))
}
