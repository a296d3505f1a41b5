//! The units exchanged with the shared document.
//!
//! Two keys live in the shared store:
//!
//! - the [`LibrarySnapshot`]: catalog + custom content, stamped with
//!   `updatedAt`/`updatedBy`; immutable once written
//! - a [`SharedMeta`] blob `{lastSyncedAt, lastSyncedBy, libraryHash}` for
//!   cheap status checks without parsing the snapshot

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use stencil_core::hash::library_hash;
use stencil_core::{ApplicationState, CustomEntityContent, EntityId, TemplateInfo};

use crate::error::{invalid, SyncError};

/// Version tag of the snapshot format.
pub const LIBRARY_SNAPSHOT_VERSION: u32 = 1;

/// Default shared-store key of the snapshot.
pub const DEFAULT_SNAPSHOT_KEY: &str = "stencil.library";

/// Default shared-store key of the metadata blob.
pub const DEFAULT_META_KEY: &str = "stencil.library.meta";

/// An immutable, timestamped export of the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibrarySnapshot {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    pub entities: Vec<TemplateInfo>,
    #[serde(default)]
    pub custom_content: BTreeMap<EntityId, CustomEntityContent>,
}

impl LibrarySnapshot {
    /// Capture the library subset of `state`.
    pub fn capture(state: &ApplicationState, updated_by: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            version: LIBRARY_SNAPSHOT_VERSION,
            updated_at: now,
            updated_by,
            entities: state.catalog.clone(),
            custom_content: state.custom_content.clone(),
        }
    }

    /// Content hash of entities + custom content. Ignores the stamps.
    pub fn library_hash(&self) -> Result<String, serde_json::Error> {
        library_hash(&self.entities, &self.custom_content)
    }

    /// Parse and validate a stored snapshot.
    pub fn parse(raw: Value) -> Result<Self, SyncError> {
        let snapshot: Self = serde_json::from_value(raw)
            .map_err(|err| invalid(format!("unreadable snapshot: {err}")))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    fn validate(&self) -> Result<(), SyncError> {
        if self.version != LIBRARY_SNAPSHOT_VERSION {
            return Err(invalid(format!(
                "snapshot version {} (expected {LIBRARY_SNAPSHOT_VERSION})",
                self.version
            )));
        }
        let mut seen = BTreeSet::new();
        for entity in &self.entities {
            if entity.id.0.is_empty() {
                return Err(invalid("entity with empty id"));
            }
            if !seen.insert(&entity.id) {
                return Err(invalid(format!("duplicate entity id '{}'", entity.id)));
            }
        }
        for (id, content) in &self.custom_content {
            if !content.is_valid() {
                return Err(invalid(format!(
                    "custom content for '{id}' lacks its base locale '{}'",
                    content.base_locale
                )));
            }
        }
        Ok(())
    }
}

/// True when `raw` claims a snapshot format newer than this build reads.
pub fn is_newer_format(raw: &Value) -> bool {
    raw.get("version")
        .and_then(Value::as_u64)
        .map_or(false, |version| version > u64::from(LIBRARY_SNAPSHOT_VERSION))
}

/// The `updatedAt`/`updatedBy` stamp of a stored snapshot, readable even when
/// the rest of the snapshot is not.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStamp {
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_by: Option<String>,
}

impl SnapshotStamp {
    /// `None` when `raw` carries no parseable `updatedAt`.
    pub fn read(raw: &Value) -> Option<Self> {
        Self::deserialize(raw).ok()
    }
}

/// Small blob written next to the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedMeta {
    pub last_synced_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_by: Option<String>,
    pub library_hash: String,
}

impl SharedMeta {
    pub fn for_snapshot(snapshot: &LibrarySnapshot, library_hash: String) -> Self {
        Self {
            last_synced_at: snapshot.updated_at,
            last_synced_by: snapshot.updated_by.clone(),
            library_hash,
        }
    }
}
