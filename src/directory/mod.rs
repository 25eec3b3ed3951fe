//! Directory service integration (LDAP / Active Directory)
//!
//! [`DirectoryConnect`] opens bound sessions; [`DirectoryConnector`] runs the
//! user-level operations (search, authenticate, password reset, full scan) on
//! top of them. Sessions are single-use and never pooled.

pub mod connector;
pub mod filter;
pub mod ldap;
pub mod password;

pub use connector::DirectoryConnector;
pub use ldap::Ldap3Connect;

use crate::domain::DirectoryEntry;
use crate::error::Result;
use async_trait::async_trait;

/// LDAP result code for invalidCredentials
pub const RC_INVALID_CREDENTIALS: u32 = 49;
/// LDAP result code for noSuchObject
pub const RC_NO_SUCH_OBJECT: u32 = 32;

/// Opens directory sessions bound as the service account.
#[async_trait]
pub trait DirectoryConnect: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>>;
}

/// One open directory connection.
///
/// Dropping a session closes the underlying connection; [`close`](Self::close)
/// additionally sends an unbind.
#[async_trait]
pub trait DirectorySession: Send {
    /// Re-bind the session as `dn`. Invalid credentials map to `DirectoryAuth`.
    async fn bind(&mut self, dn: &str, password: &str) -> Result<()>;

    /// Subtree search under `base`. A missing base yields no entries.
    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Vec<DirectoryEntry>>;

    /// Replace all values of `attribute` on `dn`.
    async fn modify_replace(&mut self, dn: &str, attribute: &str, value: Vec<u8>) -> Result<()>;

    async fn close(self: Box<Self>);
}
