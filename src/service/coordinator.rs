//! Two-store consistency for group operations.
//!
//! A group operation mutates relational rows inside a transaction and then
//! hands the transaction to [`PolicyCoordinator::finish`] together with the
//! policy command it implies. The coordinator issues the command last, commits
//! only if it succeeded, and reloads the enforcer strictly after the commit.

use crate::config::ReloadFailureMode;
use crate::error::{AppError, Result};
use crate::policy::PolicyStore;
use crate::repository::GroupTransaction;
use std::sync::Arc;
use tracing::{error, warn};

/// Policy-side effect of one group operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyCommand {
    /// Relational-only change; nothing to mirror
    Nothing,
    DeleteRole {
        role: String,
    },
    RenameRole {
        from: String,
        to: String,
    },
    SetPermissions {
        role: String,
        menu_permissions: Vec<String>,
        path_permissions: Vec<String>,
    },
    SetMembers {
        role: String,
        usernames: Vec<String>,
    },
}

impl PolicyCommand {
    fn name(&self) -> &'static str {
        match self {
            PolicyCommand::Nothing => "nothing",
            PolicyCommand::DeleteRole { .. } => "delete_role",
            PolicyCommand::RenameRole { .. } => "rename_role",
            PolicyCommand::SetPermissions { .. } => "set_role_permissions",
            PolicyCommand::SetMembers { .. } => "set_role_members",
        }
    }
}

pub struct PolicyCoordinator {
    policy: Arc<dyn PolicyStore>,
    reload_failure: ReloadFailureMode,
}

impl PolicyCoordinator {
    pub fn new(policy: Arc<dyn PolicyStore>, reload_failure: ReloadFailureMode) -> Self {
        Self {
            policy,
            reload_failure,
        }
    }

    async fn apply(&self, command: &PolicyCommand) -> Result<()> {
        match command {
            PolicyCommand::Nothing => Ok(()),
            PolicyCommand::DeleteRole { role } => self.policy.delete_role(role).await,
            PolicyCommand::RenameRole { from, to } => self.policy.rename_role(from, to).await,
            PolicyCommand::SetPermissions {
                role,
                menu_permissions,
                path_permissions,
            } => {
                self.policy
                    .set_role_permissions(role, menu_permissions, path_permissions)
                    .await
            }
            PolicyCommand::SetMembers { role, usernames } => {
                self.policy.set_role_members(role, usernames).await
            }
        }
    }

    /// Issue `command`, then commit `tx`, then reload.
    ///
    /// A failed command rolls the transaction back. A failed reload keeps the
    /// commit and is surfaced or logged according to the reload failure mode.
    pub async fn finish(&self, tx: Box<dyn GroupTransaction>, command: PolicyCommand) -> Result<()> {
        if let Err(e) = self.apply(&command).await {
            if let Err(rollback_err) = tx.rollback().await {
                error!(error = %rollback_err, "Rollback after policy failure failed");
            }
            return Err(match e {
                AppError::Policy(_) => e,
                other => AppError::Policy(other.to_string()),
            });
        }

        if let Err(e) = tx.commit().await {
            if command != PolicyCommand::Nothing {
                // Stored rules are ahead of the relational rows until repaired;
                // the enforcer keeps serving the last reloaded snapshot.
                error!(
                    error = %e,
                    command = command.name(),
                    "Commit failed after policy command was applied"
                );
            }
            return Err(e);
        }

        if command == PolicyCommand::Nothing {
            return Ok(());
        }

        self.reload().await
    }

    /// Reload the enforcer, honoring the reload failure mode.
    pub async fn reload(&self) -> Result<()> {
        match self.policy.reload_policy().await {
            Ok(()) => Ok(()),
            Err(e) => {
                let message = match e {
                    AppError::Reload(msg) => msg,
                    other => other.to_string(),
                };
                match self.reload_failure {
                    ReloadFailureMode::Fail => Err(AppError::Reload(message)),
                    ReloadFailureMode::Warn => {
                        warn!(error = %message, "Policy reload failed; changes apply on the next reload");
                        Ok(())
                    }
                }
            }
        }
    }
}
