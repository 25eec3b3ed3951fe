//! Policy store: roles, role permissions and role members persisted as casbin
//! rules, plus the in-memory enforcer they are reloaded into.
//!
//! Writes land in the rule table immediately but only become visible to
//! [`PolicyEnforcer::is_allowed`] after [`PolicyStore::reload_policy`].

pub mod enforcer;
pub mod model;
pub mod store;

pub use enforcer::PolicyEnforcer;
pub use store::CasbinRuleStore;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What a permission object names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionKind {
    Menu,
    Path,
}

impl PermissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionKind::Menu => "menu",
            PermissionKind::Path => "path",
        }
    }
}

impl std::fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PermissionKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "menu" => Ok(PermissionKind::Menu),
            "path" => Ok(PermissionKind::Path),
            other => Err(format!("unknown permission kind '{}'", other)),
        }
    }
}

/// One stored rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PolicyRule {
    /// `p, role, object, kind`
    Permission {
        role: String,
        object: String,
        kind: PermissionKind,
    },
    /// `g, username, role`
    Membership { username: String, role: String },
}

impl PolicyRule {
    pub fn permission(role: &str, object: &str, kind: PermissionKind) -> Self {
        PolicyRule::Permission {
            role: role.to_string(),
            object: object.to_string(),
            kind,
        }
    }

    pub fn membership(username: &str, role: &str) -> Self {
        PolicyRule::Membership {
            username: username.to_string(),
            role: role.to_string(),
        }
    }

    pub fn role(&self) -> &str {
        match self {
            PolicyRule::Permission { role, .. } | PolicyRule::Membership { role, .. } => role,
        }
    }
}

/// Role-level commands against the policy store.
///
/// Each command is atomic on its own; none of them joins the caller's
/// relational transaction.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Remove every permission and membership of `role`. Absent roles are a no-op.
    async fn delete_role(&self, role: &str) -> Result<()>;
    async fn rename_role(&self, old_name: &str, new_name: &str) -> Result<()>;
    /// Replace the role's permission set.
    async fn set_role_permissions(
        &self,
        role: &str,
        menu_permissions: &[String],
        path_permissions: &[String],
    ) -> Result<()>;
    /// Replace the role's member set.
    async fn set_role_members(&self, role: &str, usernames: &[String]) -> Result<()>;
    /// Make all prior writes visible to the enforcement path.
    async fn reload_policy(&self) -> Result<()>;
}
