//! Business logic layer

pub mod coordinator;
pub mod directory_sync;
pub mod group;

pub use coordinator::{PolicyCommand, PolicyCoordinator};
pub use directory_sync::{DirectorySyncService, SyncReport};
pub use group::GroupService;
