//! Error types for stencil-sync.

use chrono::{DateTime, Utc};
use thiserror::Error;

use stencil_core::{ConflictNotice, StoreError};

/// All errors that can arise from shared-document sync.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The shared snapshot is newer than this session's last sync.
    #[error("shared library was updated at {remote_updated_at}{}", by_suffix(.remote_updated_by))]
    Conflict {
        remote_updated_at: DateTime<Utc>,
        remote_updated_by: Option<String>,
    },

    /// There is no shared snapshot to pull.
    #[error("no shared library to pull")]
    NotFound,

    /// The shared snapshot exists but is not a valid library.
    #[error("shared library is corrupt: {reason}")]
    Invalid { reason: String },

    /// The shared store failed.
    #[error("shared store error: {0}")]
    Store(#[from] StoreError),

    /// JSON serialization error while building or hashing a snapshot.
    #[error("snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// The notice to surface when this is a conflict.
    pub fn conflict_notice(&self) -> Option<ConflictNotice> {
        match self {
            SyncError::Conflict {
                remote_updated_at,
                remote_updated_by,
            } => Some(ConflictNotice {
                remote_updated_at: *remote_updated_at,
                remote_updated_by: remote_updated_by.clone(),
            }),
            _ => None,
        }
    }
}

fn by_suffix(by: &Option<String>) -> String {
    by.as_deref()
        .map(|name| format!(" by {name}"))
        .unwrap_or_default()
}

/// Convenience constructor for [`SyncError::Invalid`].
pub(crate) fn invalid(reason: impl Into<String>) -> SyncError {
    SyncError::Invalid {
        reason: reason.into(),
    }
}
