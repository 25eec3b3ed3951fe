//! Directory (LDAP) API handlers

use crate::api::{MessageResponse, SuccessResponse};
use crate::domain::DirectoryUser;
use crate::error::Result;
use crate::server::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub dn: String,
    /// Local shape of the entry; absent when the entry lacks the username attribute
    pub user: Option<DirectoryUser>,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub username: String,
    pub new_password: String,
}

/// Verify directory credentials
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    let entry = state
        .directory
        .authenticate_user(&input.username, &input.password)
        .await?;
    let user = entry.to_directory_user(state.directory.user_attribute());
    Ok(Json(SuccessResponse::new(LoginResponse { dn: entry.dn, user })))
}

/// Reset a directory user's password.
///
/// No caller check happens here: any request reaching this route may reset
/// any user, so it must only be exposed behind the authenticating gateway.
/// Active Directory also refuses `unicodePwd` writes unless the connection is
/// LDAPS or StartTLS.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(input): Json<PasswordResetRequest>,
) -> Result<impl IntoResponse> {
    state
        .directory
        .reset_password(&input.username, &input.new_password)
        .await?;
    Ok(Json(MessageResponse::new("Password reset successfully")))
}

/// Run one directory sync pass
pub async fn sync_users(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let report = state.sync_service.sync_all_users().await?;
    Ok(Json(SuccessResponse::new(report)))
}
