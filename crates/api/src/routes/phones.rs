//! Phone validation and phone-to-user resolution

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};
use maxbot_profiles::{validate_phone, PhoneMapping, PhoneProfile, PhoneValidation};
use serde::{Deserialize, Serialize};

use crate::{error::ApiResult, state::AppState};

#[derive(Debug, Deserialize)]
pub struct BatchByPhoneRequest {
    #[serde(default)]
    pub phones: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchByPhoneResponse {
    pub mappings: Vec<PhoneMapping>,
}

/// `?phone=`; a literal `+` must be sent as `%2B`, though digits alone suffice
#[derive(Debug, Deserialize)]
pub struct PhoneQuery {
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct UserIdResponse {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidatePhoneRequest {
    pub phone: String,
}

pub async fn batch_by_phone(
    State(state): State<AppState>,
    payload: Result<Json<BatchByPhoneRequest>, JsonRejection>,
) -> ApiResult<Json<BatchByPhoneResponse>> {
    let Json(req) = payload?;
    let mappings = state.batch.resolve(&req.phones).await?;
    Ok(Json(BatchByPhoneResponse { mappings }))
}

pub async fn user_id_by_phone(
    State(state): State<AppState>,
    query: Result<Query<PhoneQuery>, QueryRejection>,
) -> ApiResult<Json<UserIdResponse>> {
    let Query(query) = query?;
    let user_id = state.batch.resolve_one(&query.phone).await?;
    Ok(Json(UserIdResponse { user_id }))
}

pub async fn profile_by_phone(
    State(state): State<AppState>,
    query: Result<Query<PhoneQuery>, QueryRejection>,
) -> ApiResult<Json<PhoneProfile>> {
    let Query(query) = query?;
    Ok(Json(state.batch.profile(&query.phone).await?))
}

/// Always 200; an unusable phone is `{"valid": false}`
pub async fn validate(
    payload: Result<Json<ValidatePhoneRequest>, JsonRejection>,
) -> ApiResult<Json<PhoneValidation>> {
    let Json(req) = payload?;
    Ok(Json(validate_phone(&req.phone)))
}
