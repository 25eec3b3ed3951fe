//! `casbin_rule` table backed policy store

use super::{PermissionKind, PolicyEnforcer, PolicyRule, PolicyStore};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use sqlx::{FromRow, MySql, MySqlPool, QueryBuilder};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

#[derive(Debug, FromRow)]
struct CasbinRuleRow {
    ptype: String,
    v0: String,
    v1: String,
    v2: String,
}

impl CasbinRuleRow {
    fn into_rule(self) -> Option<PolicyRule> {
        match self.ptype.as_str() {
            "p" => {
                let kind = self.v2.parse::<PermissionKind>().ok()?;
                Some(PolicyRule::Permission {
                    role: self.v0,
                    object: self.v1,
                    kind,
                })
            }
            "g" => Some(PolicyRule::Membership {
                username: self.v0,
                role: self.v1,
            }),
            _ => None,
        }
    }
}

fn policy_err(err: sqlx::Error) -> AppError {
    AppError::Policy(err.to_string())
}

pub struct CasbinRuleStore {
    pool: MySqlPool,
    enforcer: Arc<PolicyEnforcer>,
    // Two reloads must not swap in snapshots out of read order
    reload_lock: Mutex<()>,
}

impl CasbinRuleStore {
    pub fn new(pool: MySqlPool, enforcer: Arc<PolicyEnforcer>) -> Self {
        Self {
            pool,
            enforcer,
            reload_lock: Mutex::new(()),
        }
    }

    pub fn enforcer(&self) -> Arc<PolicyEnforcer> {
        self.enforcer.clone()
    }

    /// Every well-formed rule currently stored.
    pub async fn load_rules(&self) -> Result<Vec<PolicyRule>> {
        let rows = sqlx::query_as::<_, CasbinRuleRow>(
            "SELECT ptype, v0, v1, v2 FROM casbin_rule ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let total = rows.len();
        let rules: Vec<PolicyRule> = rows.into_iter().filter_map(CasbinRuleRow::into_rule).collect();
        if rules.len() != total {
            tracing::warn!(
                skipped = total - rules.len(),
                "Ignoring casbin_rule rows outside the role model"
            );
        }
        Ok(rules)
    }

    async fn reload(&self) -> Result<usize> {
        let _guard = self.reload_lock.lock().await;
        let rules = self.load_rules().await?;
        self.enforcer.replace(&rules).await?;
        Ok(rules.len())
    }
}

#[async_trait]
impl PolicyStore for CasbinRuleStore {
    async fn delete_role(&self, role: &str) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM casbin_rule WHERE (ptype = 'p' AND v0 = ?) OR (ptype = 'g' AND v1 = ?)",
        )
        .bind(role)
        .bind(role)
        .execute(&self.pool)
        .await
        .map_err(policy_err)?;

        tracing::debug!(role, removed = result.rows_affected(), "Deleted policy role");
        Ok(())
    }

    async fn rename_role(&self, old_name: &str, new_name: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(policy_err)?;

        sqlx::query("UPDATE casbin_rule SET v0 = ? WHERE ptype = 'p' AND v0 = ?")
            .bind(new_name)
            .bind(old_name)
            .execute(&mut *tx)
            .await
            .map_err(policy_err)?;

        sqlx::query("UPDATE casbin_rule SET v1 = ? WHERE ptype = 'g' AND v1 = ?")
            .bind(new_name)
            .bind(old_name)
            .execute(&mut *tx)
            .await
            .map_err(policy_err)?;

        tx.commit().await.map_err(policy_err)?;
        Ok(())
    }

    async fn set_role_permissions(
        &self,
        role: &str,
        menu_permissions: &[String],
        path_permissions: &[String],
    ) -> Result<()> {
        let rows: BTreeSet<(&str, &str)> = menu_permissions
            .iter()
            .map(|m| (m.as_str(), PermissionKind::Menu.as_str()))
            .chain(
                path_permissions
                    .iter()
                    .map(|p| (p.as_str(), PermissionKind::Path.as_str())),
            )
            .collect();

        let mut tx = self.pool.begin().await.map_err(policy_err)?;

        sqlx::query("DELETE FROM casbin_rule WHERE ptype = 'p' AND v0 = ?")
            .bind(role)
            .execute(&mut *tx)
            .await
            .map_err(policy_err)?;

        if !rows.is_empty() {
            let mut builder: QueryBuilder<MySql> =
                QueryBuilder::new("INSERT INTO casbin_rule (ptype, v0, v1, v2) ");
            builder.push_values(rows, |mut row, (object, kind)| {
                row.push_bind("p")
                    .push_bind(role)
                    .push_bind(object)
                    .push_bind(kind);
            });
            builder.build().execute(&mut *tx).await.map_err(policy_err)?;
        }

        tx.commit().await.map_err(policy_err)?;
        Ok(())
    }

    async fn set_role_members(&self, role: &str, usernames: &[String]) -> Result<()> {
        let members: BTreeSet<&str> = usernames.iter().map(String::as_str).collect();

        let mut tx = self.pool.begin().await.map_err(policy_err)?;

        sqlx::query("DELETE FROM casbin_rule WHERE ptype = 'g' AND v1 = ?")
            .bind(role)
            .execute(&mut *tx)
            .await
            .map_err(policy_err)?;

        if !members.is_empty() {
            let mut builder: QueryBuilder<MySql> =
                QueryBuilder::new("INSERT INTO casbin_rule (ptype, v0, v1, v2) ");
            builder.push_values(members, |mut row, username| {
                row.push_bind("g")
                    .push_bind(username)
                    .push_bind(role)
                    .push_bind("");
            });
            builder.build().execute(&mut *tx).await.map_err(policy_err)?;
        }

        tx.commit().await.map_err(policy_err)?;
        Ok(())
    }

    async fn reload_policy(&self) -> Result<()> {
        let start = Instant::now();
        let result = self.reload().await;
        histogram!("opsiam_policy_reload_duration_seconds").record(start.elapsed().as_secs_f64());

        match result {
            Ok(rules) => {
                counter!("opsiam_policy_reloads_total", "result" => "success").increment(1);
                tracing::debug!(rules, generation = self.enforcer.generation(), "Policy reloaded");
                Ok(())
            }
            Err(e) => {
                counter!("opsiam_policy_reloads_total", "result" => "failure").increment(1);
                Err(AppError::Reload(e.to_string()))
            }
        }
    }
}
