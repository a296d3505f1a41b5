//! # stencil-sync
//!
//! Optimistic-concurrency sync of the library subset with a shared document.
//!
//! [`SyncCoordinator::sync_to_shared`] pushes a fresh [`LibrarySnapshot`]
//! unless someone else wrote a newer one, [`SyncCoordinator::pull_from_shared`]
//! takes the shared library, and [`SyncCoordinator::resolve_conflict`] settles
//! a detected conflict. [`status::classify`] derives the observable
//! [`SyncStatus`].

pub mod coordinator;
pub mod error;
pub mod snapshot;
pub mod status;

pub use coordinator::{ConflictChoice, RemoteStatus, Resolution, SyncCoordinator};
pub use error::SyncError;
pub use snapshot::{LibrarySnapshot, SharedMeta, SnapshotStamp, LIBRARY_SNAPSHOT_VERSION};
pub use status::{classify, SyncStatus};
