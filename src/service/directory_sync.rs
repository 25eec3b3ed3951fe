//! Directory to relational user reconciliation

use crate::directory::DirectoryConnector;
use crate::domain::DirectoryUser;
use crate::error::{AppError, Result};
use crate::repository::UserRepository;
use metrics::counter;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Counts for one sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Person entries returned by the directory
    pub fetched: usize,
    /// Entries without a username or repeating an earlier username
    pub skipped: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

pub struct DirectorySyncService {
    connector: Arc<DirectoryConnector>,
    users: Arc<dyn UserRepository>,
}

impl DirectorySyncService {
    pub fn new(connector: Arc<DirectoryConnector>, users: Arc<dyn UserRepository>) -> Self {
        Self { connector, users }
    }

    /// Pull every person entry and upsert it by username.
    ///
    /// Directory failures abort before any write. Users missing from the
    /// directory are left as they are.
    #[tracing::instrument(skip(self))]
    pub async fn sync_all_users(&self) -> Result<SyncReport> {
        let entries = self.connector.search_all_users().await?;

        let mut report = SyncReport {
            fetched: entries.len(),
            ..Default::default()
        };

        let mut seen = HashSet::new();
        let mut users: Vec<DirectoryUser> = Vec::with_capacity(entries.len());
        for entry in &entries {
            match entry.to_directory_user(self.connector.user_attribute()) {
                Some(user) if seen.insert(user.username.clone()) => users.push(user),
                Some(user) => {
                    warn!(username = %user.username, dn = %entry.dn, "Duplicate directory username skipped");
                    report.skipped += 1;
                }
                None => {
                    warn!(dn = %entry.dn, "Directory entry without username skipped");
                    report.skipped += 1;
                }
            }
        }

        let summary = self
            .users
            .upsert_directory_users(&users)
            .await
            .map_err(|e| AppError::Sync(e.to_string()))?;

        report.inserted = summary.inserted;
        report.updated = summary.updated;
        report.unchanged = summary.unchanged;

        counter!("opsiam_directory_sync_users_total", "outcome" => "inserted")
            .increment(report.inserted as u64);
        counter!("opsiam_directory_sync_users_total", "outcome" => "updated")
            .increment(report.updated as u64);
        counter!("opsiam_directory_sync_users_total", "outcome" => "unchanged")
            .increment(report.unchanged as u64);
        counter!("opsiam_directory_sync_users_total", "outcome" => "skipped")
            .increment(report.skipped as u64);

        info!(
            fetched = report.fetched,
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped = report.skipped,
            "Directory sync finished"
        );
        Ok(report)
    }
}
