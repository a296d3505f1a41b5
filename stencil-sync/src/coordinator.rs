//! Reconciles the local library with the shared document.
//!
//! ## `sync_to_shared` protocol
//!
//! 1. Capture a [`LibrarySnapshot`] of the current state, `updatedAt = now`.
//! 2. Read the existing shared snapshot (if any).
//! 3. If its `updatedAt` is strictly newer than the session's `lastSyncedAt`,
//!    return [`SyncError::Conflict`] without writing. A session that never
//!    synced treats any existing snapshot as newer. An unreadable snapshot is
//!    judged by its `updatedAt` alone and refused when it has none; one in a
//!    newer format is left alone.
//! 4. Write the snapshot, then the metadata blob, and return the new
//!    [`SyncMeta`].
//!
//! The metadata blob is advisory: a failed meta write is logged, the sync
//! still counts. Conflict decisions always read the full snapshot.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stencil_core::{ApplicationState, KvStore, SyncMeta};

use crate::error::{invalid, SyncError};
use crate::snapshot::{
    is_newer_format, LibrarySnapshot, SharedMeta, SnapshotStamp, DEFAULT_META_KEY,
    DEFAULT_SNAPSHOT_KEY,
};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// The user's answer to a conflict notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictChoice {
    /// Take the shared library, discarding local library edits.
    Pull,
    /// Write the local library over the shared one.
    Overwrite,
}

/// Outcome of [`SyncCoordinator::resolve_conflict`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Pulled(Box<ApplicationState>),
    Overwritten(SyncMeta),
}

/// What the metadata blob says about the shared library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    /// Nothing has been shared yet.
    Absent,
    /// The last shared write is the one this session knows about (or older).
    UpToDate { library_hash: String },
    /// Someone synced after this session did.
    RemoteNewer {
        last_synced_at: DateTime<Utc>,
        last_synced_by: Option<String>,
        library_hash: String,
    },
}

// ---------------------------------------------------------------------------
// SyncCoordinator
// ---------------------------------------------------------------------------

pub struct SyncCoordinator {
    shared: Arc<dyn KvStore>,
    snapshot_key: String,
    meta_key: String,
}

impl SyncCoordinator {
    /// A coordinator using the default shared keys.
    pub fn new(shared: Arc<dyn KvStore>) -> Self {
        Self::with_keys(shared, DEFAULT_SNAPSHOT_KEY, DEFAULT_META_KEY)
    }

    pub fn with_keys(
        shared: Arc<dyn KvStore>,
        snapshot_key: impl Into<String>,
        meta_key: impl Into<String>,
    ) -> Self {
        Self {
            shared,
            snapshot_key: snapshot_key.into(),
            meta_key: meta_key.into(),
        }
    }

    /// Read and validate the shared snapshot. `Ok(None)` when absent.
    pub async fn read_snapshot(&self) -> Result<Option<LibrarySnapshot>, SyncError> {
        match self.shared.get(&self.snapshot_key).await? {
            Some(raw) => LibrarySnapshot::parse(raw).map(Some),
            None => Ok(None),
        }
    }

    /// Read the metadata blob. `Ok(None)` when absent.
    pub async fn read_meta(&self) -> Result<Option<SharedMeta>, SyncError> {
        match self.shared.get(&self.meta_key).await? {
            Some(raw) => serde_json::from_value(raw)
                .map(Some)
                .map_err(|err| invalid(format!("unreadable library metadata: {err}"))),
            None => Ok(None),
        }
    }

    /// Push the library subset of `state`, refusing when the shared snapshot
    /// is newer than this session's last sync.
    pub async fn sync_to_shared(&self, state: &ApplicationState) -> Result<SyncMeta, SyncError> {
        if let Some(raw) = self.shared.get(&self.snapshot_key).await? {
            if is_newer_format(&raw) {
                return Err(invalid("shared library uses a newer snapshot format"));
            }
            let stamp = SnapshotStamp::read(&raw);
            let remote = match LibrarySnapshot::parse(raw) {
                Ok(remote) => SnapshotStamp {
                    updated_at: remote.updated_at,
                    updated_by: remote.updated_by,
                },
                Err(err) => match stamp {
                    Some(stamp) => {
                        tracing::warn!("shared library is unreadable ({err}); checking its stamp only");
                        stamp
                    }
                    None => {
                        return Err(invalid(format!(
                            "shared library is unreadable and undated: {err}"
                        )))
                    }
                },
            };
            let newer = state
                .sync_meta
                .last_synced_at
                .map_or(true, |known| remote.updated_at > known);
            if newer {
                tracing::info!(
                    "conflict: shared library updated at {} (last synced {:?})",
                    remote.updated_at,
                    state.sync_meta.last_synced_at
                );
                return Err(SyncError::Conflict {
                    remote_updated_at: remote.updated_at,
                    remote_updated_by: remote.updated_by,
                });
            }
        }
        self.write(state).await
    }

    /// Write unconditionally. Only call after the user acknowledged a conflict.
    pub async fn overwrite(&self, state: &ApplicationState) -> Result<SyncMeta, SyncError> {
        self.write(state).await
    }

    /// Replace the local library with the shared one.
    ///
    /// The returned state carries the remote catalog and custom content, no
    /// generated record, a selection that points into the new catalog, and
    /// sync metadata describing the pulled snapshot.
    pub async fn pull_from_shared(
        &self,
        state: &ApplicationState,
    ) -> Result<ApplicationState, SyncError> {
        let remote = self.read_snapshot().await?.ok_or(SyncError::NotFound)?;
        let hash = remote.library_hash()?;

        let mut pulled = state.clone();
        pulled.catalog = remote.entities;
        pulled.custom_content = remote.custom_content;
        pulled.generated = None;
        pulled.export_status = None;
        pulled.pending_conflict = None;
        if pulled.repair_selection() {
            tracing::debug!(
                "selection moved to {:?} after pull",
                pulled.selected_entity_id
            );
        }
        pulled.sync_meta = SyncMeta {
            last_synced_at: Some(remote.updated_at),
            last_synced_by: remote.updated_by,
            last_synced_remote_hash: Some(hash),
        };

        tracing::info!(
            "pulled shared library: {} entities, {} custom",
            pulled.catalog.len(),
            pulled.custom_content.len()
        );
        Ok(pulled)
    }

    pub async fn resolve_conflict(
        &self,
        state: &ApplicationState,
        choice: ConflictChoice,
    ) -> Result<Resolution, SyncError> {
        match choice {
            ConflictChoice::Pull => self
                .pull_from_shared(state)
                .await
                .map(|pulled| Resolution::Pulled(Box::new(pulled))),
            ConflictChoice::Overwrite => self.overwrite(state).await.map(Resolution::Overwritten),
        }
    }

    /// Compare the metadata blob with this session's sync bookkeeping without
    /// reading the snapshot.
    pub async fn check_remote(&self, state: &ApplicationState) -> Result<RemoteStatus, SyncError> {
        let Some(meta) = self.read_meta().await? else {
            return Ok(RemoteStatus::Absent);
        };
        let newer = state
            .sync_meta
            .last_synced_at
            .map_or(true, |known| meta.last_synced_at > known);
        if newer {
            Ok(RemoteStatus::RemoteNewer {
                last_synced_at: meta.last_synced_at,
                last_synced_by: meta.last_synced_by,
                library_hash: meta.library_hash,
            })
        } else {
            Ok(RemoteStatus::UpToDate {
                library_hash: meta.library_hash,
            })
        }
    }

    async fn write(&self, state: &ApplicationState) -> Result<SyncMeta, SyncError> {
        let actor = state.settings.actor.clone();
        let snapshot = LibrarySnapshot::capture(state, actor.clone(), Utc::now());
        let hash = snapshot.library_hash()?;

        self.shared
            .set(&self.snapshot_key, serde_json::to_value(&snapshot)?)
            .await?;

        let meta = SharedMeta::for_snapshot(&snapshot, hash.clone());
        match serde_json::to_value(&meta) {
            Ok(value) => {
                if let Err(err) = self.shared.set(&self.meta_key, value).await {
                    tracing::warn!("writing library metadata failed: {err}");
                }
            }
            Err(err) => tracing::warn!("serializing library metadata failed: {err}"),
        }

        tracing::info!(
            "shared library written at {} ({} entities)",
            snapshot.updated_at,
            snapshot.entities.len()
        );
        Ok(SyncMeta {
            last_synced_at: Some(snapshot.updated_at),
            last_synced_by: actor,
            last_synced_remote_hash: Some(hash),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stencil_core::MemoryStore;

    fn coordinator() -> (Arc<MemoryStore>, SyncCoordinator) {
        let shared = Arc::new(MemoryStore::new());
        (shared.clone(), SyncCoordinator::new(shared))
    }

    #[tokio::test]
    async fn first_sync_writes_snapshot_and_meta() {
        let (shared, sync) = coordinator();
        let mut state = ApplicationState::default();
        state.settings.actor = Some("ana".into());

        let meta = sync.sync_to_shared(&state).await.unwrap();
        assert_eq!(meta.last_synced_by.as_deref(), Some("ana"));
        assert_eq!(shared.writes(DEFAULT_SNAPSHOT_KEY).await, 1);
        assert_eq!(shared.writes(DEFAULT_META_KEY).await, 1);

        let stored = sync.read_meta().await.unwrap().unwrap();
        assert_eq!(Some(stored.last_synced_at), meta.last_synced_at);
        assert_eq!(Some(stored.library_hash), meta.last_synced_remote_hash);
    }

    #[tokio::test]
    async fn resync_after_own_write_is_not_a_conflict() {
        let (_shared, sync) = coordinator();
        let mut state = ApplicationState::default();
        state.sync_meta = sync.sync_to_shared(&state).await.unwrap();
        state.catalog.pop();
        assert!(sync.sync_to_shared(&state).await.is_ok());
    }

    #[tokio::test]
    async fn never_synced_session_conflicts_with_existing_snapshot() {
        let (_shared, sync) = coordinator();
        let mut writer = ApplicationState::default();
        writer.settings.actor = Some("bo".into());
        sync.sync_to_shared(&writer).await.unwrap();

        let err = sync
            .sync_to_shared(&ApplicationState::default())
            .await
            .unwrap_err();
        let notice = err.conflict_notice().unwrap();
        assert_eq!(notice.remote_updated_by.as_deref(), Some("bo"));
    }

    #[tokio::test]
    async fn unreadable_remote_is_judged_by_its_stamp() {
        let (shared, sync) = coordinator();
        let mut state = ApplicationState::default();
        state.sync_meta = sync.sync_to_shared(&state).await.unwrap();
        let known = state.sync_meta.last_synced_at.unwrap();

        let older = (known - chrono::Duration::minutes(5)).to_rfc3339();
        shared
            .set(
                DEFAULT_SNAPSHOT_KEY,
                serde_json::json!({"version": 1, "updatedAt": older, "entities": 3}),
            )
            .await
            .unwrap();
        state.sync_meta = sync.sync_to_shared(&state).await.unwrap();
        assert!(sync.read_snapshot().await.unwrap().is_some(), "replaced");

        shared
            .set(DEFAULT_SNAPSHOT_KEY, serde_json::json!({"entities": 3}))
            .await
            .unwrap();
        let err = sync.sync_to_shared(&state).await.unwrap_err();
        assert!(matches!(err, SyncError::Invalid { .. }));

        shared
            .set(DEFAULT_SNAPSHOT_KEY, serde_json::json!({"version": 9}))
            .await
            .unwrap();
        let err = sync.sync_to_shared(&state).await.unwrap_err();
        assert!(matches!(err, SyncError::Invalid { .. }));
    }

    #[tokio::test]
    async fn newer_unreadable_remote_conflicts_without_writing() {
        let (shared, sync) = coordinator();
        let mut state = ApplicationState::default();
        state.sync_meta = sync.sync_to_shared(&state).await.unwrap();

        let later = (Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        shared
            .set(
                DEFAULT_SNAPSHOT_KEY,
                serde_json::json!({
                    "version": 1,
                    "updatedAt": later,
                    "updatedBy": "li",
                    "entities": [{"id": "a"}, {"id": "a"}],
                }),
            )
            .await
            .unwrap();
        let writes = shared.writes(DEFAULT_SNAPSHOT_KEY).await;

        let err = sync.sync_to_shared(&state).await.unwrap_err();
        let notice = err.conflict_notice().expect("conflict");
        assert_eq!(notice.remote_updated_by.as_deref(), Some("li"));
        assert_eq!(shared.writes(DEFAULT_SNAPSHOT_KEY).await, writes);

        let resolved = sync
            .resolve_conflict(&state, ConflictChoice::Overwrite)
            .await
            .unwrap();
        assert!(matches!(resolved, Resolution::Overwritten(_)));
        assert!(sync.read_snapshot().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn pull_without_snapshot_is_not_found() {
        let (_shared, sync) = coordinator();
        let err = sync
            .pull_from_shared(&ApplicationState::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound));
    }

    #[tokio::test]
    async fn custom_keys_are_honored() {
        let shared = Arc::new(MemoryStore::new());
        let sync = SyncCoordinator::with_keys(shared.clone(), "lib", "lib.meta");
        sync.sync_to_shared(&ApplicationState::default()).await.unwrap();
        assert_eq!(shared.keys().await, vec!["lib", "lib.meta"]);
        assert_eq!(shared.writes(DEFAULT_SNAPSHOT_KEY).await, 0);
    }

    #[tokio::test]
    async fn check_remote_reads_only_the_meta_blob() {
        let (shared, sync) = coordinator();
        let mut state = ApplicationState::default();
        assert_eq!(sync.check_remote(&state).await.unwrap(), RemoteStatus::Absent);

        state.sync_meta = sync.sync_to_shared(&state).await.unwrap();
        assert!(matches!(
            sync.check_remote(&state).await.unwrap(),
            RemoteStatus::UpToDate { .. }
        ));

        // A newer meta blob alone is enough; the snapshot is never read.
        shared.remove(DEFAULT_SNAPSHOT_KEY).await.unwrap();
        let later = state.sync_meta.last_synced_at.unwrap() + chrono::Duration::minutes(5);
        shared
            .set(
                DEFAULT_META_KEY,
                serde_json::json!({
                    "lastSyncedAt": later,
                    "lastSyncedBy": "cy",
                    "libraryHash": "00"
                }),
            )
            .await
            .unwrap();
        assert_eq!(
            sync.check_remote(&state).await.unwrap(),
            RemoteStatus::RemoteNewer {
                last_synced_at: later,
                last_synced_by: Some("cy".into()),
                library_hash: "00".into(),
            }
        );
    }
}
