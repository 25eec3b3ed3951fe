//! Domain models for ops-iam-core

pub mod common;
pub mod directory;
pub mod group;
pub mod user;

pub use common::*;
pub use directory::*;
pub use group::*;
pub use user::*;
