//! User domain model

use super::common::UserOrigin;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User entity
///
/// `username` is the join key with the policy store, which never sees numeric ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub name: String,
    /// Only meaningful for locally authenticated users; empty for directory users
    #[serde(skip_serializing, default)]
    pub password: String,
    pub is_active: bool,
    pub phone_number: String,
    pub email: String,
    pub user_from: UserOrigin,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for User {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            username: String::new(),
            name: String::new(),
            password: String::new(),
            is_active: true,
            phone_number: String::new(),
            email: String::new(),
            user_from: UserOrigin::Local,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A user as seen by the directory, ready to be upserted by username
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub username: String,
    pub name: String,
    pub is_active: bool,
    pub phone_number: String,
    pub email: String,
}

impl DirectoryUser {
    /// Whether the stored row already carries exactly this directory state.
    pub fn matches(&self, user: &User) -> bool {
        user.username == self.username
            && user.name == self.name
            && user.is_active == self.is_active
            && user.phone_number == self.phone_number
            && user.email == self.email
            && user.user_from == UserOrigin::Ldap
            && user.password.is_empty()
    }
}

/// Outcome of one bulk upsert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl UpsertSummary {
    /// Rows actually written
    pub fn writes(&self) -> usize {
        self.inserted + self.updated
    }
}
