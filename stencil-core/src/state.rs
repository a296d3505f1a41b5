//! The canonical in-memory state and its persisted projection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::builtin_catalog;
use crate::types::{
    ConflictNotice, CustomEntityContent, EntityId, ExportStatus, GeneratedContentRecord,
    LayoutMode, Locale, ResolvedIssues, Settings, SyncMeta, TemplateInfo, Tone,
};

/// Version tag written into every [`PersistedRecord`].
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// The schema-versioned subset of [`ApplicationState`] stored by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRecord {
    pub schema_version: u32,
    pub locale: Locale,
    pub tone: Tone,
    pub layout_mode: LayoutMode,
    pub selected_entity_id: Option<EntityId>,
    pub catalog: Vec<TemplateInfo>,
    pub custom_content: BTreeMap<EntityId, CustomEntityContent>,
    pub resolved_issues: ResolvedIssues,
    pub settings: Settings,
    pub sync_meta: SyncMeta,
}

impl Default for PersistedRecord {
    fn default() -> Self {
        let catalog = builtin_catalog();
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            locale: Locale::default(),
            tone: Tone::default(),
            layout_mode: LayoutMode::default(),
            selected_entity_id: catalog.first().map(|t| t.id.clone()),
            catalog,
            custom_content: BTreeMap::new(),
            resolved_issues: ResolvedIssues::new(),
            settings: Settings::default(),
            sync_meta: SyncMeta::default(),
        }
    }
}

/// Work in flight, surfaced so the UI can show progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BusyFlags {
    pub syncing: bool,
    pub pulling: bool,
    pub generating: bool,
}

impl BusyFlags {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// The full state of one session. Ephemeral fields never reach the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationState {
    pub locale: Locale,
    pub tone: Tone,
    pub layout_mode: LayoutMode,
    pub selected_entity_id: Option<EntityId>,
    pub catalog: Vec<TemplateInfo>,
    pub custom_content: BTreeMap<EntityId, CustomEntityContent>,
    pub resolved_issues: ResolvedIssues,
    pub settings: Settings,
    pub sync_meta: SyncMeta,

    // ephemeral
    pub busy: BusyFlags,
    pub generated: Option<GeneratedContentRecord>,
    pub export_status: Option<ExportStatus>,
    pub pending_conflict: Option<ConflictNotice>,
}

impl Default for ApplicationState {
    fn default() -> Self {
        Self::from_record(PersistedRecord::default())
    }
}

impl ApplicationState {
    /// Add back idle ephemeral fields to a persisted record.
    pub fn from_record(record: PersistedRecord) -> Self {
        Self {
            locale: record.locale,
            tone: record.tone,
            layout_mode: record.layout_mode,
            selected_entity_id: record.selected_entity_id,
            catalog: record.catalog,
            custom_content: record.custom_content,
            resolved_issues: record.resolved_issues,
            settings: record.settings,
            sync_meta: record.sync_meta,
            busy: BusyFlags::default(),
            generated: None,
            export_status: None,
            pending_conflict: None,
        }
    }

    /// Drop ephemeral fields and stamp the current schema version.
    pub fn to_record(&self) -> PersistedRecord {
        PersistedRecord {
            schema_version: CURRENT_SCHEMA_VERSION,
            locale: self.locale.clone(),
            tone: self.tone,
            layout_mode: self.layout_mode,
            selected_entity_id: self.selected_entity_id.clone(),
            catalog: self.catalog.clone(),
            custom_content: self.custom_content.clone(),
            resolved_issues: self.resolved_issues.clone(),
            settings: self.settings.clone(),
            sync_meta: self.sync_meta.clone(),
        }
    }

    pub fn entity(&self, id: &EntityId) -> Option<&TemplateInfo> {
        self.catalog.iter().find(|t| &t.id == id)
    }

    pub fn selected(&self) -> Option<&TemplateInfo> {
        self.selected_entity_id.as_ref().and_then(|id| self.entity(id))
    }

    /// Locale shown for the selection: the session locale, unless the selected
    /// custom entity lacks it, in which case its base locale.
    pub fn effective_locale(&self) -> Locale {
        self.selected_entity_id
            .as_ref()
            .and_then(|id| self.custom_content.get(id))
            .map(|content| content.effective_locale(&self.locale).clone())
            .unwrap_or_else(|| self.locale.clone())
    }

    /// Keep the selection pointing into the catalog: the first entry when the
    /// current id is missing, `None` for an empty catalog.
    pub fn repair_selection(&mut self) -> bool {
        let valid = self
            .selected_entity_id
            .as_ref()
            .is_some_and(|id| self.entity(id).is_some());
        if valid {
            return false;
        }
        let next = self.catalog.first().map(|t| t.id.clone());
        let changed = next != self.selected_entity_id;
        self.selected_entity_id = next;
        changed
    }
}
