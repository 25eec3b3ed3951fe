//! Authorization group domain models

use super::user::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Group entity
///
/// A role group (`is_role_group`) is mirrored into the policy store as a role
/// with the same name; a plain group never appears there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Group {
    pub id: u64,
    pub name: String,
    pub is_role_group: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Group {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: String::new(),
            is_role_group: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Group with its members (for API responses)
#[derive(Debug, Clone, Serialize)]
pub struct GroupWithUsers {
    #[serde(flatten)]
    pub group: Group,
    pub users: Vec<User>,
}

/// One page of groups
#[derive(Debug, Clone, Serialize)]
pub struct GroupList {
    pub items: Vec<Group>,
    pub total: i64,
}

/// Input for creating a group
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateGroupInput {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[serde(default)]
    pub is_role_group: bool,
}

/// Input for renaming a group
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateGroupInput {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
}

/// Full replacement of a role group's permissions
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateGroupPermissionInput {
    #[validate(custom(function = "validate_permission_list"))]
    pub menu_permissions: Vec<String>,
    #[validate(custom(function = "validate_permission_list"))]
    pub path_permissions: Vec<String>,
}

/// Full replacement of a group's members
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateGroupUsersInput {
    pub users: Vec<u64>,
}

/// Query for listing groups
#[derive(Debug, Clone, Deserialize)]
pub struct GroupListQuery {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

impl GroupListQuery {
    /// Row offset of the requested page; `None` when it does not fit in an i64.
    pub fn offset(&self) -> Option<i64> {
        self.page.checked_sub(1)?.checked_mul(self.limit)
    }
}

fn validate_permission_list(values: &[String]) -> Result<(), validator::ValidationError> {
    if values.iter().any(|v| v.trim().is_empty() || v.len() > 255) {
        return Err(validator::ValidationError::new("invalid_permission"));
    }
    Ok(())
}
