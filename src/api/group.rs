//! Group API handlers

use crate::api::{MessageResponse, PaginatedResponse, SuccessResponse, MAX_PER_PAGE};
use crate::domain::{
    CreateGroupInput, GroupListQuery, UpdateGroupInput, UpdateGroupPermissionInput,
    UpdateGroupUsersInput,
};
use crate::error::Result;
use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

/// List groups
pub async fn list(
    State(state): State<AppState>,
    Query(mut query): Query<GroupListQuery>,
) -> Result<impl IntoResponse> {
    query.limit = query.limit.min(MAX_PER_PAGE);
    let groups = state.group_service.list(&query).await?;
    Ok(Json(PaginatedResponse::new(
        groups.items,
        query.page,
        query.limit,
        groups.total,
    )))
}

/// Get group by ID
pub async fn get(State(state): State<AppState>, Path(id): Path<u64>) -> Result<impl IntoResponse> {
    let group = state.group_service.get(id).await?;
    Ok(Json(SuccessResponse::new(group)))
}

/// Create group
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreateGroupInput>,
) -> Result<impl IntoResponse> {
    let group = state.group_service.create(input).await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(group))))
}

/// Rename group
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(input): Json<UpdateGroupInput>,
) -> Result<impl IntoResponse> {
    let group = state.group_service.update(id, input).await?;
    Ok(Json(SuccessResponse::new(group)))
}

/// Delete group
pub async fn delete(State(state): State<AppState>, Path(id): Path<u64>) -> Result<impl IntoResponse> {
    state.group_service.delete(id).await?;
    Ok(Json(MessageResponse::new("Group deleted successfully")))
}

/// Replace a role group's permissions
pub async fn update_permissions(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(input): Json<UpdateGroupPermissionInput>,
) -> Result<impl IntoResponse> {
    state.group_service.update_permissions(id, input).await?;
    Ok(Json(MessageResponse::new("Group permissions updated successfully")))
}

/// Replace a group's members
pub async fn update_users(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(input): Json<UpdateGroupUsersInput>,
) -> Result<impl IntoResponse> {
    let group = state.group_service.update_users(id, input).await?;
    Ok(Json(SuccessResponse::new(group)))
}
