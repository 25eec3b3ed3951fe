//! In-memory stand-ins for the relational store, the policy store and the
//! directory, shared by unit tests.
//!
//! The relational fake copies state on `begin` and writes it back on
//! `commit`, so a dropped or rolled back transaction leaves no trace. Both
//! store fakes append to a shared [`Journal`] so tests can assert ordering.

use crate::config::{
    Config, DatabaseConfig, LdapConfig, PolicyConfig, ReloadFailureMode, TelemetryConfig,
};
use crate::directory::filter::PERSON_FILTER;
use crate::directory::{DirectoryConnect, DirectoryConnector, DirectorySession};
use crate::domain::{
    CreateGroupInput, DirectoryEntry, DirectoryUser, Group, UpsertSummary, User, UserOrigin,
};
use crate::error::{AppError, Result};
use crate::policy::{PermissionKind, PolicyEnforcer, PolicyRule, PolicyStore};
use crate::repository::user::plan_upsert;
use crate::repository::{GroupRepository, GroupTransaction, UserRepository};
use crate::server::{build_router, AppState};
use crate::service::{DirectorySyncService, GroupService, PolicyCoordinator};
use async_trait::async_trait;
use axum::response::Response;
use axum::Router;
use chrono::Utc;
use sqlx::mysql::MySqlPoolOptions;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn injected(what: &str) -> AppError {
    AppError::Database(sqlx::Error::Protocol(format!("injected {} failure", what)))
}

/// Ordered record of store events
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == event)
    }
}

// ============================================================
// Relational store
// ============================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationalState {
    pub groups: BTreeMap<u64, Group>,
    pub users: BTreeMap<u64, User>,
    pub members: BTreeMap<u64, BTreeSet<u64>>,
    next_group_id: u64,
    next_user_id: u64,
}

#[derive(Default)]
struct StoreFlags {
    fail_commit: bool,
    fail_upsert: bool,
    user_writes: usize,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<RelationalState>>,
    flags: Arc<Mutex<StoreFlags>>,
    journal: Journal,
}

impl InMemoryStore {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    pub fn with_user(&self, username: &str) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_user_id += 1;
        let id = state.next_user_id;
        state.users.insert(
            id,
            User {
                id,
                username: username.to_string(),
                name: username.to_string(),
                ..Default::default()
            },
        );
        id
    }

    pub fn with_group(&self, name: &str, is_role_group: bool) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_group_id += 1;
        let id = state.next_group_id;
        state.groups.insert(
            id,
            Group {
                id,
                name: name.to_string(),
                is_role_group,
                ..Default::default()
            },
        );
        id
    }

    pub fn snapshot(&self) -> RelationalState {
        self.state.lock().unwrap().clone()
    }

    pub fn member_usernames(&self, group_id: u64) -> BTreeSet<String> {
        let state = self.state.lock().unwrap();
        state
            .members
            .get(&group_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.users.get(id))
                    .map(|u| u.username.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn user(&self, username: &str) -> Option<User> {
        let state = self.state.lock().unwrap();
        state.users.values().find(|u| u.username == username).cloned()
    }

    pub fn insert_user(&self, user: User) {
        let mut state = self.state.lock().unwrap();
        state.next_user_id = state.next_user_id.max(user.id);
        state.users.insert(user.id, user);
    }

    pub fn fail_commit(&self, fail: bool) {
        self.flags.lock().unwrap().fail_commit = fail;
    }

    pub fn fail_upsert(&self, fail: bool) {
        self.flags.lock().unwrap().fail_upsert = fail;
    }

    pub fn user_writes(&self) -> usize {
        self.flags.lock().unwrap().user_writes
    }
}

#[async_trait]
impl GroupRepository for InMemoryStore {
    async fn list(&self, name: Option<String>, offset: i64, limit: i64) -> Result<Vec<Group>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .groups
            .values()
            .filter(|g| name.as_deref().map_or(true, |n| g.name.contains(n)))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&self, name: Option<String>) -> Result<i64> {
        let state = self.state.lock().unwrap();
        Ok(state
            .groups
            .values()
            .filter(|g| name.as_deref().map_or(true, |n| g.name.contains(n)))
            .count() as i64)
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<Group>> {
        Ok(self.state.lock().unwrap().groups.get(&id).cloned())
    }

    async fn create(&self, input: &CreateGroupInput) -> Result<Group> {
        let mut state = self.state.lock().unwrap();
        if state.groups.values().any(|g| g.name == input.name) {
            return Err(AppError::Conflict(format!(
                "Group '{}' already exists",
                input.name
            )));
        }
        state.next_group_id += 1;
        let group = Group {
            id: state.next_group_id,
            name: input.name.clone(),
            is_role_group: input.is_role_group,
            ..Default::default()
        };
        state.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn begin(&self) -> Result<Box<dyn GroupTransaction>> {
        Ok(Box::new(MemoryTransaction {
            working: self.snapshot(),
            store: self.clone(),
        }))
    }
}

pub struct MemoryTransaction {
    store: InMemoryStore,
    working: RelationalState,
}

#[async_trait]
impl GroupTransaction for MemoryTransaction {
    async fn lock_group(&mut self, id: u64) -> Result<Option<Group>> {
        Ok(self.working.groups.get(&id).cloned())
    }

    async fn delete_group(&mut self, id: u64) -> Result<()> {
        self.working.members.remove(&id);
        self.working
            .groups
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Group {} not found", id)))
    }

    async fn rename_group(&mut self, id: u64, name: &str) -> Result<Group> {
        if self
            .working
            .groups
            .values()
            .any(|g| g.name == name && g.id != id)
        {
            return Err(AppError::Conflict(format!("Group '{}' already exists", name)));
        }
        let group = self
            .working
            .groups
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Group {} not found", id)))?;
        group.name = name.to_string();
        group.updated_at = Utc::now();
        Ok(group.clone())
    }

    async fn find_users(&mut self, ids: &[u64]) -> Result<Vec<User>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.working.users.get(id))
            .cloned()
            .collect())
    }

    async fn replace_members(&mut self, group_id: u64, user_ids: &[u64]) -> Result<()> {
        self.working
            .members
            .insert(group_id, user_ids.iter().copied().collect());
        Ok(())
    }

    async fn find_members(&mut self, group_id: u64) -> Result<Vec<User>> {
        let ids = self.working.members.get(&group_id).cloned().unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| self.working.users.get(id))
            .cloned()
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction { store, working } = *self;
        if store.flags.lock().unwrap().fail_commit {
            return Err(injected("commit"));
        }
        *store.state.lock().unwrap() = working;
        store.journal.record("commit");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.store.journal.record("rollback");
        Ok(())
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn upsert_directory_users(&self, users: &[DirectoryUser]) -> Result<UpsertSummary> {
        if self.flags.lock().unwrap().fail_upsert {
            return Err(injected("upsert"));
        }

        let mut state = self.state.lock().unwrap();
        let existing: HashMap<String, User> = state
            .users
            .values()
            .map(|u| (u.username.clone(), u.clone()))
            .collect();
        let plan = plan_upsert(&existing, users);

        for du in plan.inserts.iter().chain(plan.updates.iter()) {
            let id = match existing.get(&du.username) {
                Some(row) => row.id,
                None => {
                    state.next_user_id += 1;
                    state.next_user_id
                }
            };
            let created_at = existing
                .get(&du.username)
                .map(|row| row.created_at)
                .unwrap_or_else(Utc::now);
            state.users.insert(
                id,
                User {
                    id,
                    username: du.username.clone(),
                    name: du.name.clone(),
                    password: String::new(),
                    is_active: du.is_active,
                    phone_number: du.phone_number.clone(),
                    email: du.email.clone(),
                    user_from: UserOrigin::Ldap,
                    created_at,
                    updated_at: Utc::now(),
                },
            );
        }

        let summary = plan.summary();
        self.flags.lock().unwrap().user_writes += summary.writes();
        Ok(summary)
    }
}

// ============================================================
// Policy store
// ============================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyState {
    pub permissions: BTreeMap<String, BTreeSet<(PermissionKind, String)>>,
    pub members: BTreeMap<String, BTreeSet<String>>,
}

impl PolicyState {
    fn rules(&self) -> Vec<PolicyRule> {
        let permissions = self.permissions.iter().flat_map(|(role, perms)| {
            perms
                .iter()
                .map(move |(kind, object)| PolicyRule::permission(role, object, *kind))
        });
        let members = self.members.iter().flat_map(|(role, users)| {
            users
                .iter()
                .map(move |username| PolicyRule::membership(username, role))
        });
        permissions.chain(members).collect()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.permissions.contains_key(role) || self.members.contains_key(role)
    }
}

#[derive(Default)]
struct PolicyFlags {
    fail_commands: bool,
    fail_reload: bool,
}

#[derive(Clone)]
pub struct InMemoryPolicyStore {
    state: Arc<Mutex<PolicyState>>,
    flags: Arc<Mutex<PolicyFlags>>,
    enforcer: Arc<PolicyEnforcer>,
    journal: Journal,
}

impl InMemoryPolicyStore {
    pub async fn new(journal: Journal) -> Self {
        Self {
            state: Arc::default(),
            flags: Arc::default(),
            enforcer: Arc::new(PolicyEnforcer::empty().await.unwrap()),
            journal,
        }
    }

    pub fn state(&self) -> PolicyState {
        self.state.lock().unwrap().clone()
    }

    pub fn enforcer(&self) -> Arc<PolicyEnforcer> {
        self.enforcer.clone()
    }

    pub fn members(&self, role: &str) -> BTreeSet<String> {
        self.state().members.get(role).cloned().unwrap_or_default()
    }

    pub fn fail_commands(&self, fail: bool) {
        self.flags.lock().unwrap().fail_commands = fail;
    }

    pub fn fail_reload(&self, fail: bool) {
        self.flags.lock().unwrap().fail_reload = fail;
    }

    fn command(&self, event: String) -> Result<std::sync::MutexGuard<'_, PolicyState>> {
        if self.flags.lock().unwrap().fail_commands {
            return Err(AppError::Policy(format!("injected failure: {}", event)));
        }
        self.journal.record(event);
        Ok(self.state.lock().unwrap())
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn delete_role(&self, role: &str) -> Result<()> {
        let mut state = self.command(format!("delete_role:{}", role))?;
        state.permissions.remove(role);
        state.members.remove(role);
        Ok(())
    }

    async fn rename_role(&self, old_name: &str, new_name: &str) -> Result<()> {
        let mut state = self.command(format!("rename_role:{}->{}", old_name, new_name))?;
        if let Some(perms) = state.permissions.remove(old_name) {
            state.permissions.insert(new_name.to_string(), perms);
        }
        if let Some(members) = state.members.remove(old_name) {
            state.members.insert(new_name.to_string(), members);
        }
        Ok(())
    }

    async fn set_role_permissions(
        &self,
        role: &str,
        menu_permissions: &[String],
        path_permissions: &[String],
    ) -> Result<()> {
        let mut state = self.command(format!("set_role_permissions:{}", role))?;
        let perms: BTreeSet<(PermissionKind, String)> = menu_permissions
            .iter()
            .map(|m| (PermissionKind::Menu, m.clone()))
            .chain(path_permissions.iter().map(|p| (PermissionKind::Path, p.clone())))
            .collect();
        if perms.is_empty() {
            state.permissions.remove(role);
        } else {
            state.permissions.insert(role.to_string(), perms);
        }
        Ok(())
    }

    async fn set_role_members(&self, role: &str, usernames: &[String]) -> Result<()> {
        let mut state = self.command(format!("set_role_members:{}", role))?;
        let members: BTreeSet<String> = usernames.iter().cloned().collect();
        if members.is_empty() {
            state.members.remove(role);
        } else {
            state.members.insert(role.to_string(), members);
        }
        Ok(())
    }

    async fn reload_policy(&self) -> Result<()> {
        if self.flags.lock().unwrap().fail_reload {
            return Err(AppError::Reload("injected reload failure".to_string()));
        }
        let rules = self.state().rules();
        self.enforcer.replace(&rules).await?;
        self.journal.record("reload");
        Ok(())
    }
}

// ============================================================
// Directory
// ============================================================

#[derive(Default)]
struct DirectoryState {
    roots: Vec<(String, Vec<DirectoryEntry>)>,
    passwords: HashMap<String, String>,
    searched: Vec<String>,
    modifications: Vec<(String, String, Vec<u8>)>,
    connections: usize,
    open: usize,
    unreachable: bool,
}

#[derive(Clone, Default)]
pub struct FakeDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, base: &str, entry: DirectoryEntry, password: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state
                .passwords
                .insert(entry.dn.clone(), password.to_string());
            match state.roots.iter_mut().find(|(b, _)| b == base) {
                Some((_, entries)) => entries.push(entry),
                None => state.roots.push((base.to_string(), vec![entry])),
            }
        }
        self
    }

    pub fn unreachable(self) -> Self {
        self.state.lock().unwrap().unreachable = true;
        self
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    pub fn searched_bases(&self) -> Vec<String> {
        self.state.lock().unwrap().searched.clone()
    }

    pub fn modifications(&self) -> Vec<(String, String, Vec<u8>)> {
        self.state.lock().unwrap().modifications.clone()
    }

    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().connections
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().unwrap().open
    }
}

#[async_trait]
impl DirectoryConnect for FakeDirectory {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>> {
        let mut state = self.state.lock().unwrap();
        if state.unreachable {
            return Err(AppError::DirectoryConnection(
                "connection refused".to_string(),
            ));
        }
        state.connections += 1;
        state.open += 1;
        Ok(Box::new(FakeSession {
            state: self.state.clone(),
        }))
    }
}

struct FakeSession {
    state: Arc<Mutex<DirectoryState>>,
}

/// Understands the two filter shapes the connector issues.
fn filter_matches(filter: &str, entry: &DirectoryEntry) -> bool {
    if filter == PERSON_FILTER {
        return true;
    }
    let assertion = filter
        .strip_prefix(&format!("(&{}(", PERSON_FILTER))
        .and_then(|rest| rest.strip_suffix("))"));
    match assertion.and_then(|a| a.split_once('=')) {
        Some((attribute, value)) => entry.attr(attribute) == value,
        None => false,
    }
}

#[async_trait]
impl DirectorySession for FakeSession {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let state = self.state.lock().unwrap();
        match state.passwords.get(dn) {
            Some(expected) if expected == password => Ok(()),
            _ => Err(AppError::DirectoryAuth(
                "invalid credentials or account disabled".to_string(),
            )),
        }
    }

    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        _attributes: &[&str],
    ) -> Result<Vec<DirectoryEntry>> {
        let mut state = self.state.lock().unwrap();
        state.searched.push(base.to_string());
        Ok(state
            .roots
            .iter()
            .find(|(b, _)| b == base)
            .map(|(_, entries)| {
                entries
                    .iter()
                    .filter(|e| filter_matches(filter, e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn modify_replace(&mut self, dn: &str, attribute: &str, value: Vec<u8>) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .modifications
            .push((dn.to_string(), attribute.to_string(), value));
        Ok(())
    }

    async fn close(self: Box<Self>) {
        self.state.lock().unwrap().open -= 1;
    }
}

// ============================================================
// HTTP
// ============================================================

/// Search root used by [`TestApp`]'s directory
pub const TEST_ROOT: &str = "ou=people,dc=corp,dc=example";

/// Router state backed by the in-memory fakes.
///
/// The pool points at a closed port so `/ready` fails fast.
pub struct TestApp {
    pub state: AppState,
    pub store: InMemoryStore,
    pub policy: InMemoryPolicyStore,
    pub directory: FakeDirectory,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_directory(FakeDirectory::new()).await
    }

    pub async fn with_directory(directory: FakeDirectory) -> Self {
        let journal = Journal::default();
        let store = InMemoryStore::new(journal.clone());
        let policy = InMemoryPolicyStore::new(journal).await;

        let config = Config {
            http_host: "127.0.0.1".to_string(),
            http_port: 0,
            request_timeout_secs: 5,
            database: DatabaseConfig {
                url: "mysql://root@127.0.0.1:1/ops_iam_test".to_string(),
                max_connections: 1,
                min_connections: 0,
                acquire_timeout_secs: 1,
            },
            policy: PolicyConfig {
                reload_failure: ReloadFailureMode::Fail,
                reload_interval_secs: 0,
                ..Default::default()
            },
            ldap: LdapConfig {
                url: "ldaps://ldap.corp.example".to_string(),
                search_dns: vec![TEST_ROOT.to_string()],
                user_attribute: "uid".to_string(),
                ..Default::default()
            },
            telemetry: TelemetryConfig::default(),
        };

        let db_pool = MySqlPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy(&config.database.url)
            .unwrap();

        let coordinator = PolicyCoordinator::new(
            Arc::new(policy.clone()),
            config.policy.reload_failure,
        );
        let connector = Arc::new(DirectoryConnector::new(
            Arc::new(directory.clone()),
            &config.ldap,
        ));

        let state = AppState {
            group_service: Arc::new(GroupService::new(Arc::new(store.clone()), coordinator)),
            sync_service: Arc::new(DirectorySyncService::new(
                connector.clone(),
                Arc::new(store.clone()),
            )),
            directory: connector,
            policy: Arc::new(policy.clone()),
            enforcer: policy.enforcer(),
            db_pool,
            config: Arc::new(config),
        };

        Self {
            state,
            store,
            policy,
            directory,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone(), None)
    }
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
