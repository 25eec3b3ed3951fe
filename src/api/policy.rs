//! Policy enforcement diagnostics

use crate::api::SuccessResponse;
use crate::error::Result;
use crate::policy::PermissionKind;
use crate::server::AppState;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct PolicyCheckQuery {
    pub username: String,
    pub object: String,
    pub kind: PermissionKind,
}

#[derive(Debug, Serialize)]
pub struct PolicyCheckResponse {
    pub allowed: bool,
    /// Enforcer snapshot the answer came from
    pub generation: u64,
}

/// Ask the loaded enforcer whether `username` may access `object`
pub async fn check(
    State(state): State<AppState>,
    Query(query): Query<PolicyCheckQuery>,
) -> Result<impl IntoResponse> {
    let allowed = state
        .enforcer
        .is_allowed(&query.username, &query.object, query.kind)
        .await?;
    Ok(Json(SuccessResponse::new(PolicyCheckResponse {
        allowed,
        generation: state.enforcer.generation(),
    })))
}

#[derive(Debug, Serialize)]
pub struct PolicyReloadResponse {
    pub generation: u64,
}

/// Rebuild the enforcer from the stored rules
pub async fn reload(State(state): State<AppState>) -> Result<impl IntoResponse> {
    state.policy.reload_policy().await?;
    Ok(Json(SuccessResponse::new(PolicyReloadResponse {
        generation: state.enforcer.generation(),
    })))
}
