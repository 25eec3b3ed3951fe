//! REST API handlers and shared response types

pub mod directory;
pub mod group;
pub mod health;
pub mod metrics;
pub mod policy;

use serde::{Deserialize, Serialize};

/// Maximum allowed page size
pub(crate) const MAX_PER_PAGE: i64 = 100;

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl<T: Serialize> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, page: i64, per_page: i64, total: i64) -> Self {
        let total_pages = (total as f64 / per_page as f64).ceil() as i64;
        Self {
            data,
            pagination: PaginationMeta {
                page,
                per_page,
                total,
                total_pages,
            },
        }
    }
}

/// Success response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Message response (for delete, etc.)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginated_response_total_pages() {
        let response = PaginatedResponse::new(vec![1, 2, 3], 1, 10, 25);
        assert_eq!(response.pagination.total_pages, 3);

        let response = PaginatedResponse::<i32>::new(vec![], 1, 10, 0);
        assert_eq!(response.pagination.total_pages, 0);

        let response = PaginatedResponse::new(vec![1], 2, 10, 20);
        assert_eq!(response.pagination.total_pages, 2);
    }

    #[test]
    fn test_success_response_serialization() {
        let json = serde_json::to_value(SuccessResponse::new("ok")).unwrap();
        assert_eq!(json["data"], "ok");
    }

    #[test]
    fn test_message_response_serialization() {
        let json = serde_json::to_string(&MessageResponse::new("Group deleted")).unwrap();
        assert_eq!(json, r#"{"message":"Group deleted"}"#);
    }
}
