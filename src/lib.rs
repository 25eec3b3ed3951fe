//! ops-iam-core - Authorization and directory backend
//!
//! Keeps authorization groups consistent across the relational store and the
//! casbin policy store, and connects to an LDAP or Active Directory server
//! for authentication, password resets and user sync.

pub mod api;
pub mod config;
pub mod directory;
pub mod domain;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod policy;
pub mod repository;
pub mod server;
pub mod service;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
