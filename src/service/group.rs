//! Group, role permission and membership business logic

use super::coordinator::{PolicyCommand, PolicyCoordinator};
use crate::domain::{
    CreateGroupInput, Group, GroupList, GroupListQuery, GroupWithUsers, UpdateGroupInput,
    UpdateGroupPermissionInput, UpdateGroupUsersInput,
};
use crate::error::{AppError, Result};
use crate::repository::{GroupRepository, GroupTransaction};
use metrics::counter;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

pub struct GroupService {
    groups: Arc<dyn GroupRepository>,
    coordinator: PolicyCoordinator,
}

fn record<T>(operation: &'static str, result: &Result<T>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(AppError::Reload(_)) => "reload_failed",
        Err(_) => "failure",
    };
    counter!(
        "opsiam_group_operations_total",
        "operation" => operation,
        "result" => outcome
    )
    .increment(1);
}

impl GroupService {
    pub fn new(groups: Arc<dyn GroupRepository>, coordinator: PolicyCoordinator) -> Self {
        Self {
            groups,
            coordinator,
        }
    }

    async fn lock(tx: &mut dyn GroupTransaction, id: u64) -> Result<Group> {
        tx.lock_group(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Group {} not found", id)))
    }

    pub async fn list(&self, query: &GroupListQuery) -> Result<GroupList> {
        if query.page < 1 || query.limit < 1 {
            return Err(AppError::Validation(
                "page and limit must be at least 1".to_string(),
            ));
        }

        let offset = query
            .offset()
            .ok_or_else(|| AppError::Validation("page is out of range".to_string()))?;

        let name = query.name.clone().filter(|n| !n.is_empty());
        let items = self.groups.list(name.clone(), offset, query.limit).await?;
        let total = self.groups.count(name).await?;

        Ok(GroupList { items, total })
    }

    pub async fn get(&self, id: u64) -> Result<Group> {
        self.groups
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Group {} not found", id)))
    }

    /// Insert a group row. The policy store learns about a role group only once
    /// it gets permissions or members.
    pub async fn create(&self, input: CreateGroupInput) -> Result<Group> {
        input.validate()?;
        let result = self.groups.create(&input).await;
        record("create", &result);
        let group = result?;
        info!(group_id = group.id, name = %group.name, role = group.is_role_group, "Group created");
        Ok(group)
    }

    pub async fn update(&self, id: u64, input: UpdateGroupInput) -> Result<Group> {
        input.validate()?;
        let result = self.rename(id, &input.name).await;
        record("update", &result);
        result
    }

    async fn rename(&self, id: u64, new_name: &str) -> Result<Group> {
        let mut tx = self.groups.begin().await?;
        let current = Self::lock(tx.as_mut(), id).await?;
        if current.name == new_name {
            tx.commit().await?;
            return Ok(current);
        }

        let renamed = tx.rename_group(id, new_name).await?;
        let command = if current.is_role_group {
            PolicyCommand::RenameRole {
                from: current.name.clone(),
                to: renamed.name.clone(),
            }
        } else {
            PolicyCommand::Nothing
        };

        self.coordinator.finish(tx, command).await?;
        info!(group_id = id, from = %current.name, to = %renamed.name, "Group renamed");
        Ok(renamed)
    }

    /// Delete a group, its memberships and any policy role of the same name.
    pub async fn delete(&self, id: u64) -> Result<()> {
        let result = self.remove(id).await;
        record("delete", &result);
        result
    }

    async fn remove(&self, id: u64) -> Result<()> {
        let mut tx = self.groups.begin().await?;
        let group = Self::lock(tx.as_mut(), id).await?;
        tx.delete_group(id).await?;

        // Issued for plain groups too so a stale role of the same name cannot survive
        let command = PolicyCommand::DeleteRole {
            role: group.name.clone(),
        };
        self.coordinator.finish(tx, command).await?;

        info!(group_id = id, name = %group.name, "Group deleted");
        Ok(())
    }

    /// Replace the permission set of a role group.
    pub async fn update_permissions(&self, id: u64, input: UpdateGroupPermissionInput) -> Result<()> {
        input.validate()?;
        let result = self.replace_permissions(id, input).await;
        record("update_permissions", &result);
        result
    }

    async fn replace_permissions(&self, id: u64, input: UpdateGroupPermissionInput) -> Result<()> {
        let mut tx = self.groups.begin().await?;
        let group = Self::lock(tx.as_mut(), id).await?;
        if !group.is_role_group {
            return Err(AppError::Domain(format!(
                "Group '{}' is not a role group",
                group.name
            )));
        }

        let command = PolicyCommand::SetPermissions {
            role: group.name.clone(),
            menu_permissions: dedup(input.menu_permissions),
            path_permissions: dedup(input.path_permissions),
        };
        self.coordinator.finish(tx, command).await?;

        info!(group_id = id, role = %group.name, "Role permissions replaced");
        Ok(())
    }

    /// Replace a group's members; role groups mirror the usernames into the
    /// policy store.
    pub async fn update_users(&self, id: u64, input: UpdateGroupUsersInput) -> Result<GroupWithUsers> {
        let result = self.replace_users(id, input).await;
        record("update_users", &result);
        result
    }

    async fn replace_users(&self, id: u64, input: UpdateGroupUsersInput) -> Result<GroupWithUsers> {
        if input.users.is_empty() {
            return Err(AppError::Domain(
                "role group requires at least one member".to_string(),
            ));
        }
        let user_ids: Vec<u64> = input
            .users
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut tx = self.groups.begin().await?;
        let group = Self::lock(tx.as_mut(), id).await?;

        let users = tx.find_users(&user_ids).await?;
        if users.len() != user_ids.len() {
            let found: BTreeSet<u64> = users.iter().map(|u| u.id).collect();
            let missing: Vec<String> = user_ids
                .iter()
                .filter(|id| !found.contains(*id))
                .map(|id| id.to_string())
                .collect();
            return Err(AppError::NotFound(format!(
                "Users not found: {}",
                missing.join(", ")
            )));
        }

        tx.replace_members(id, &user_ids).await?;
        let members = tx.find_members(id).await?;

        let command = if group.is_role_group {
            PolicyCommand::SetMembers {
                role: group.name.clone(),
                usernames: users.iter().map(|u| u.username.clone()).collect(),
            }
        } else {
            PolicyCommand::Nothing
        };
        self.coordinator.finish(tx, command).await?;

        info!(group_id = id, members = members.len(), "Group members replaced");
        Ok(GroupWithUsers {
            group,
            users: members,
        })
    }
}

/// Drop repeated entries, keeping first-seen order.
fn dedup(values: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}
