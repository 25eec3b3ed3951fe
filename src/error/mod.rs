//! Unified error handling for ops-iam-core

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation is not valid for the current state of the entity
    #[error("Domain error: {0}")]
    Domain(String),

    #[error("Directory connection error: {0}")]
    DirectoryConnection(String),

    #[error("Directory authentication error: {0}")]
    DirectoryAuth(String),

    /// Policy table or enforcer command failed before the relational commit
    #[error("Policy store error: {0}")]
    Policy(String),

    /// Relational state is committed but the enforcer still serves the old policy
    #[error("Policy reload error: {0}")]
    Reload(String),

    #[error("Directory sync error: {0}")]
    Sync(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether a caller may retry the same request unchanged.
    ///
    /// Downstream failures (database, directory connectivity, policy store,
    /// reload, sync) are transient; input and state errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::DirectoryConnection(_)
                | AppError::Policy(_)
                | AppError::Reload(_)
                | AppError::Sync(_)
                | AppError::Database(_)
        )
    }

    /// Map a sqlx error, turning unique-key violations into `Conflict`.
    pub fn from_write(err: sqlx::Error, conflict_message: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(conflict_message.into())
            }
            _ => AppError::Database(err),
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let retryable = self.is_retryable();
        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation", msg.clone())
            }
            AppError::Domain(msg) => (StatusCode::BAD_REQUEST, "domain", msg.clone()),
            AppError::DirectoryAuth(msg) => {
                (StatusCode::UNAUTHORIZED, "directory_auth", msg.clone())
            }
            AppError::DirectoryConnection(msg) => {
                tracing::error!("Directory connection error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "directory_unavailable",
                    "Directory service is unavailable".to_string(),
                )
            }
            AppError::Policy(msg) => {
                tracing::error!("Policy store error: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "policy_store_error",
                    "Policy store is unavailable".to_string(),
                )
            }
            AppError::Reload(msg) => {
                tracing::error!("Policy reload error: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "policy_reload_error",
                    "Change saved, but the policy view may be stale until the next reload"
                        .to_string(),
                )
            }
            AppError::Sync(msg) => {
                tracing::error!("Directory sync error: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "sync_error",
                    "Directory sync did not complete, retry the whole pass".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            retryable,
        });

        (status, body).into_response()
    }
}

// Conversion from validation errors
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl From<casbin::Error> for AppError {
    fn from(err: casbin::Error) -> Self {
        AppError::Policy(err.to_string())
    }
}
