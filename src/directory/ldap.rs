//! ldap3 backed directory sessions

use super::{DirectoryConnect, DirectorySession, RC_INVALID_CREDENTIALS, RC_NO_SUCH_OBJECT};
use crate::config::LdapConfig;
use crate::domain::DirectoryEntry;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Mod, Scope, SearchEntry};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

fn connection_err(context: &str, err: LdapError) -> AppError {
    AppError::DirectoryConnection(format!("{}: {}", context, err))
}

pub struct Ldap3Connect {
    config: LdapConfig,
}

impl Ldap3Connect {
    pub fn new(config: LdapConfig) -> Self {
        if !config.tls_verify {
            warn!("LDAP TLS certificate verification is disabled");
        }
        Self { config }
    }

    fn settings(&self) -> LdapConnSettings {
        LdapConnSettings::new()
            .set_conn_timeout(self.config.connect_timeout())
            .set_starttls(self.config.starttls)
            .set_no_tls_verify(!self.config.tls_verify)
    }
}

#[async_trait]
impl DirectoryConnect for Ldap3Connect {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>> {
        debug!(url = %self.config.url, "Connecting to directory");

        let (conn, ldap) = LdapConnAsync::with_settings(self.settings(), &self.config.url)
            .await
            .map_err(|e| connection_err(&format!("failed to connect to {}", self.config.url), e))?;

        // The driver task ends once every Ldap handle is dropped
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        let mut session = Ldap3Session {
            ldap,
            timeout: self.config.operation_timeout(),
        };
        if let Err(e) = session
            .bind(&self.config.bind_dn, &self.config.bind_password)
            .await
        {
            session.ldap.unbind().await.ok();
            return Err(match e {
                AppError::DirectoryAuth(_) => {
                    AppError::DirectoryAuth("service account bind rejected".to_string())
                }
                other => other,
            });
        }

        Ok(Box::new(session))
    }
}

pub struct Ldap3Session {
    ldap: Ldap,
    timeout: Duration,
}

#[async_trait]
impl DirectorySession for Ldap3Session {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let result = self
            .ldap
            .with_timeout(self.timeout)
            .simple_bind(dn, password)
            .await
            .map_err(|e| connection_err("bind failed", e))?;

        match result.rc {
            0 => Ok(()),
            RC_INVALID_CREDENTIALS => Err(AppError::DirectoryAuth(
                "invalid credentials or account disabled".to_string(),
            )),
            rc => Err(AppError::DirectoryConnection(format!(
                "bind failed with code {}: {}",
                rc, result.text
            ))),
        }
    }

    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Vec<DirectoryEntry>> {
        let result = self
            .ldap
            .with_timeout(self.timeout)
            .search(base, Scope::Subtree, filter, attributes.to_vec())
            .await
            .map_err(|e| connection_err("search failed", e))?;

        let ldap3::SearchResult(entries, status) = result;
        match status.rc {
            0 => {}
            RC_NO_SUCH_OBJECT => {
                warn!(base, "Search root does not exist");
                return Ok(vec![]);
            }
            rc => {
                return Err(AppError::DirectoryConnection(format!(
                    "search under {} failed with code {}: {}",
                    base, rc, status.text
                )))
            }
        }

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| DirectoryEntry {
                dn: entry.dn,
                attrs: entry.attrs,
            })
            .collect())
    }

    async fn modify_replace(&mut self, dn: &str, attribute: &str, value: Vec<u8>) -> Result<()> {
        let mods = vec![Mod::Replace(
            attribute.as_bytes().to_vec(),
            HashSet::from([value]),
        )];

        let result = self
            .ldap
            .with_timeout(self.timeout)
            .modify(dn, mods)
            .await
            .map_err(|e| connection_err("modify failed", e))?;

        match result.rc {
            0 => Ok(()),
            RC_NO_SUCH_OBJECT => Err(AppError::NotFound(format!("directory entry {}", dn))),
            rc => Err(AppError::DirectoryConnection(format!(
                "modify of {} failed with code {}: {}",
                dn, rc, result.text
            ))),
        }
    }

    async fn close(self: Box<Self>) {
        let mut session = self;
        if let Err(e) = session.ldap.unbind().await {
            debug!(error = %e, "LDAP unbind failed");
        }
    }
}
