//! User-level directory operations

use super::filter::{user_filter, PERSON_FILTER};
use super::password::password_modification;
use super::{DirectoryConnect, DirectorySession};
use crate::config::LdapConfig;
use crate::domain::{DirectoryEntry, DirectoryFlavor};
use crate::error::{AppError, Result};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attributes read for every user entry besides the username attribute
const ENTRY_ATTRIBUTES: [&str; 4] = ["cn", "mail", "telephoneNumber", "userAccountControl"];

pub struct DirectoryConnector {
    connect: Arc<dyn DirectoryConnect>,
    search_dns: Vec<String>,
    user_attribute: String,
    flavor: DirectoryFlavor,
    encrypted: bool,
}

impl DirectoryConnector {
    pub fn new(connect: Arc<dyn DirectoryConnect>, config: &LdapConfig) -> Self {
        Self {
            connect,
            search_dns: config.search_dns.clone(),
            user_attribute: config.user_attribute.clone(),
            flavor: config.flavor(),
            encrypted: config.is_encrypted(),
        }
    }

    pub fn flavor(&self) -> DirectoryFlavor {
        self.flavor
    }

    pub fn user_attribute(&self) -> &str {
        &self.user_attribute
    }

    fn attributes(&self) -> Vec<&str> {
        std::iter::once(self.user_attribute.as_str())
            .chain(ENTRY_ATTRIBUTES)
            .collect()
    }

    fn record<T>(operation: &'static str, result: &Result<T>) {
        let outcome = if result.is_ok() { "success" } else { "failure" };
        counter!(
            "opsiam_directory_operations_total",
            "operation" => operation,
            "result" => outcome
        )
        .increment(1);
    }

    /// Open a session bound as the service account.
    pub async fn connect(&self) -> Result<Box<dyn DirectorySession>> {
        let result = self.connect.connect().await;
        Self::record("connect", &result);
        result
    }

    /// Find one user, searching the configured roots in order.
    ///
    /// The first root with a hit wins; later roots are not queried.
    pub async fn search_user(
        &self,
        session: &mut dyn DirectorySession,
        username: &str,
    ) -> Result<DirectoryEntry> {
        let filter = user_filter(&self.user_attribute, username);
        let attributes = self.attributes();

        for base in &self.search_dns {
            let mut entries = session.search(base, &filter, &attributes).await?;
            if entries.is_empty() {
                continue;
            }
            if entries.len() > 1 {
                warn!(
                    base = %base,
                    username,
                    count = entries.len(),
                    "Multiple directory entries match, using the first"
                );
            }
            let entry = entries.swap_remove(0);
            debug!(base = %base, dn = %entry.dn, "Directory user found");
            return Ok(entry);
        }

        Err(AppError::NotFound(format!(
            "Directory user '{}' not found",
            username
        )))
    }

    /// Verify a user's credentials by binding as the user's entry.
    #[tracing::instrument(skip(self, password))]
    pub async fn authenticate_user(&self, username: &str, password: &str) -> Result<DirectoryEntry> {
        if username.trim().is_empty() {
            return Err(AppError::Validation("username is required".to_string()));
        }
        // An empty password would be an unauthenticated bind, which servers accept
        if password.is_empty() {
            return Err(AppError::DirectoryAuth(
                "invalid credentials or account disabled".to_string(),
            ));
        }

        let mut session = self.connect().await?;
        let result = self.authenticate_in(session.as_mut(), username, password).await;
        session.close().await;

        Self::record("authenticate", &result);
        if result.is_ok() {
            info!(username, "Directory authentication succeeded");
        }
        result
    }

    async fn authenticate_in(
        &self,
        session: &mut dyn DirectorySession,
        username: &str,
        password: &str,
    ) -> Result<DirectoryEntry> {
        let entry = self.search_user(session, username).await?;
        session.bind(&entry.dn, password).await?;
        Ok(entry)
    }

    /// Replace a user's password with the flavor's encoding.
    #[tracing::instrument(skip(self, new_password), fields(flavor = ?self.flavor))]
    pub async fn reset_password(&self, username: &str, new_password: &str) -> Result<()> {
        if username.trim().is_empty() {
            return Err(AppError::Validation("username is required".to_string()));
        }
        if new_password.is_empty() {
            return Err(AppError::Validation("new password is required".to_string()));
        }
        if self.flavor == DirectoryFlavor::ActiveDirectory && !self.encrypted {
            warn!("Active Directory rejects unicodePwd changes over an unencrypted connection");
        }

        let mut session = self.connect().await?;
        let result = self.reset_in(session.as_mut(), username, new_password).await;
        session.close().await;

        Self::record("reset_password", &result);
        if result.is_ok() {
            info!(username, "Directory password reset");
        }
        result
    }

    async fn reset_in(
        &self,
        session: &mut dyn DirectorySession,
        username: &str,
        new_password: &str,
    ) -> Result<()> {
        let entry = self.search_user(session, username).await?;
        let (attribute, value) = password_modification(self.flavor, new_password);
        session.modify_replace(&entry.dn, attribute, value).await
    }

    /// Every person entry under every configured root, in root order.
    pub async fn search_all_users(&self) -> Result<Vec<DirectoryEntry>> {
        let mut session = self.connect().await?;
        let result = self.search_all_in(session.as_mut()).await;
        session.close().await;

        Self::record("search_all", &result);
        result
    }

    async fn search_all_in(&self, session: &mut dyn DirectorySession) -> Result<Vec<DirectoryEntry>> {
        let attributes = self.attributes();
        let mut all = Vec::new();
        for base in &self.search_dns {
            let entries = session.search(base, PERSON_FILTER, &attributes).await?;
            debug!(base = %base, count = entries.len(), "Directory root scanned");
            all.extend(entries);
        }
        Ok(all)
    }
}
