//! stencil core library: domain types, state store, migration, hashing.
//!
//! - [`types`] / [`state`]: the data model and its persisted projection
//! - [`migrate`]: turns any stored blob into a current-schema record
//! - [`hash`]: deterministic content hashing
//! - [`kv`]: host key-value surfaces
//! - [`store`]: [`StateStore`], the single owner of session state
//! - [`generated`]: the generated-content cache and its staleness rules
//! - [`library`]: state mutations

pub mod catalog;
pub mod error;
pub mod generated;
pub mod hash;
pub mod kv;
pub mod library;
pub mod migrate;
pub mod state;
pub mod store;
pub mod types;

pub use error::{CoreError, StoreError};
pub use kv::{FileStore, KvStore, MemoryStore};
pub use migrate::{migrate, migrate_with_report, MigrationReport, ResetReason};
pub use state::{ApplicationState, PersistedRecord, CURRENT_SCHEMA_VERSION};
pub use store::StateStore;
pub use types::{
    ConflictNotice, ContentPayload, ContentStatus, CustomEntityContent, EntityId,
    GeneratedContentRecord, LayoutMode, Locale, LocaleContent, Settings, SyncMeta, TemplateInfo,
    Tone, VariantId,
};
