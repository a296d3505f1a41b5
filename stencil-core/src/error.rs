//! Error types for stencil-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{EntityId, Locale};

/// Failures raised by a host key-value surface.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error, with the backing path for context.
    #[error("I/O error for key '{key}' at {path}: {source}")]
    Io {
        key: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stored value was not valid JSON.
    #[error("store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `dirs::home_dir()` returned `None`; cannot locate `~/.stencil/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The host refused or failed the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(
    key: impl Into<String>,
    path: impl Into<PathBuf>,
    source: std::io::Error,
) -> StoreError {
    StoreError::Io {
        key: key.into(),
        path: path.into(),
        source,
    }
}

/// Errors from state mutations and generated-content consumers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The referenced entity is not in the catalog.
    #[error("unknown entity '{0}'")]
    UnknownEntity(EntityId),

    /// The operation needs a selected entity.
    #[error("no entity selected")]
    NoSelection,

    /// Only user-created entities carry mutable content.
    #[error("entity '{0}' is a system template and cannot be modified")]
    NotCustom(EntityId),

    /// The entity has no content for the requested locale.
    #[error("entity '{entity}' has no content for locale '{locale}'")]
    UnknownLocale { entity: EntityId, locale: Locale },

    /// Locale tags must be non-blank.
    #[error("invalid locale '{0}'")]
    InvalidLocale(Locale),

    /// The locale already exists on the entity.
    #[error("entity '{entity}' already has locale '{locale}'")]
    DuplicateLocale { entity: EntityId, locale: Locale },

    /// Nothing has been generated for this session yet.
    #[error("no generated content; run generate first")]
    NoGeneration,

    /// The generated content no longer matches the live selection.
    #[error("generated content is stale (generated for {found}, current is {expected})")]
    StaleGeneration { expected: String, found: String },

}
