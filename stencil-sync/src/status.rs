//! Sync status classification.
//!
//! Precedence:
//! 1. `Conflicted` (a conflict notice is pending)
//! 2. `NeverSynced` (no `lastSyncedAt`)
//! 3. `LocallyModified` (library hash differs from `lastSyncedRemoteHash`)
//! 4. `Synced`

use std::fmt;

use serde::Serialize;

use stencil_core::hash::library_hash;
use stencil_core::ApplicationState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    NeverSynced,
    Synced,
    LocallyModified,
    Conflicted,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncStatus::NeverSynced => "never-synced",
            SyncStatus::Synced => "synced",
            SyncStatus::LocallyModified => "locally-modified",
            SyncStatus::Conflicted => "conflicted",
        };
        f.write_str(label)
    }
}

/// Classify `state` against its own sync bookkeeping.
pub fn classify(state: &ApplicationState) -> Result<SyncStatus, serde_json::Error> {
    if state.pending_conflict.is_some() {
        return Ok(SyncStatus::Conflicted);
    }
    if state.sync_meta.last_synced_at.is_none() {
        return Ok(SyncStatus::NeverSynced);
    }
    let current = library_hash(&state.catalog, &state.custom_content)?;
    if state.sync_meta.last_synced_remote_hash.as_deref() == Some(current.as_str()) {
        Ok(SyncStatus::Synced)
    } else {
        Ok(SyncStatus::LocallyModified)
    }
}
