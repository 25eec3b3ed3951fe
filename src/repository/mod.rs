//! Data access layer (Repository pattern)

pub mod group;
pub mod user;

pub use group::{GroupRepository, GroupRepositoryImpl, GroupTransaction};
pub use user::{UserRepository, UserRepositoryImpl};
