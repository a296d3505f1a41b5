use thiserror::Error;

use stencil_core::CoreError;
use stencil_sync::SyncError;

/// Error surface of intent handling and the session runtime.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("there is no sync conflict to resolve")]
    NoPendingConflict,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}

impl SessionError {
    /// True for a sync conflict awaiting a user decision.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SessionError::Sync(SyncError::Conflict { .. }))
    }
}
