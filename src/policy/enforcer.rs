//! In-memory enforcement path.
//!
//! The enforcer is rebuilt from the full rule set on every reload and swapped
//! in whole, so readers always see one consistent policy snapshot.

use super::model::casbin_model;
use super::{PermissionKind, PolicyRule};
use crate::error::Result;
use casbin::{CoreApi, Enforcer, MemoryAdapter, MgmtApi};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Build a fresh in-memory enforcer holding exactly `rules`.
pub async fn build_enforcer(rules: &[PolicyRule]) -> casbin::Result<Enforcer> {
    let model = casbin_model().await?;
    let adapter = MemoryAdapter::default();
    let mut enforcer = Enforcer::new(model, adapter).await?;

    // casbin rejects a batch containing a rule it already holds
    let mut policies = BTreeSet::new();
    let mut groupings = BTreeSet::new();
    for rule in rules {
        match rule {
            PolicyRule::Permission { role, object, kind } => {
                policies.insert(vec![
                    role.clone(),
                    object.clone(),
                    kind.as_str().to_string(),
                ]);
            }
            PolicyRule::Membership { username, role } => {
                groupings.insert(vec![username.clone(), role.clone()]);
            }
        }
    }

    if !policies.is_empty() {
        enforcer.add_policies(policies.into_iter().collect()).await?;
    }
    if !groupings.is_empty() {
        enforcer
            .add_grouping_policies(groupings.into_iter().collect())
            .await?;
    }

    enforcer.build_role_links()?;
    Ok(enforcer)
}

pub struct PolicyEnforcer {
    current: RwLock<Arc<Enforcer>>,
    generation: AtomicU64,
}

impl PolicyEnforcer {
    /// Enforcer that denies everything until the first reload.
    pub async fn empty() -> Result<Self> {
        let enforcer = build_enforcer(&[]).await?;
        Ok(Self {
            current: RwLock::new(Arc::new(enforcer)),
            generation: AtomicU64::new(0),
        })
    }

    /// Replace the served policy with `rules`.
    ///
    /// The new enforcer is fully built before the swap; on error the previous
    /// snapshot keeps serving.
    pub async fn replace(&self, rules: &[PolicyRule]) -> Result<()> {
        let enforcer = build_enforcer(rules).await?;
        *self.current.write().await = Arc::new(enforcer);
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub async fn is_allowed(
        &self,
        username: &str,
        object: &str,
        kind: PermissionKind,
    ) -> Result<bool> {
        let enforcer = self.current.read().await.clone();
        let allowed = enforcer.enforce((username, object, kind.as_str()))?;
        Ok(allowed)
    }

    /// Number of successful swaps since startup
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}
