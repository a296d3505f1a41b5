//! Messages crossing the session boundary.
//!
//! [`Intent`]s come in from the UI layer, [`Notification`]s go out. Both are
//! JSON-tagged by `type` so a host can bridge them over any channel.

use serde::{Deserialize, Serialize};

use stencil_core::generated::is_stale;
use stencil_core::hash::library_hash;
use stencil_core::{
    ApplicationState, ConflictNotice, ContentPayload, EntityId, GeneratedContentRecord,
    LayoutMode, Locale, Tone, VariantId,
};
use stencil_sync::{classify, ConflictChoice, SyncStatus};

/// A request from the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Intent {
    Initialize,
    ChangeLocale { locale: Locale },
    ChangeTone { tone: Tone },
    SelectEntity { id: EntityId },
    SetLayoutMode { mode: LayoutMode },
    ToggleResolvedIssue { index: u32 },
    CreateCustomEntity { from: EntityId, name: String },
    RenameEntity { id: EntityId, name: String },
    DeleteEntity { id: EntityId },
    AddLocale { id: EntityId, locale: Locale },
    EditVariant {
        id: EntityId,
        locale: Locale,
        variant: VariantId,
        payload: ContentPayload,
    },
    Generate,
    Export,
    InsertIntoCanvas,
    RequestSyncToShared,
    RequestPullFromShared,
    ResolveConflict { choice: ConflictChoice },
    SetAutoSync { enabled: bool },
    SetActor { name: Option<String> },
}

impl Intent {
    /// Intents that change the catalog or custom content.
    pub fn is_library_mutation(&self) -> bool {
        matches!(
            self,
            Intent::CreateCustomEntity { .. }
                | Intent::RenameEntity { .. }
                | Intent::DeleteEntity { .. }
                | Intent::AddLocale { .. }
                | Intent::EditVariant { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Intent::Initialize => "initialize",
            Intent::ChangeLocale { .. } => "change-locale",
            Intent::ChangeTone { .. } => "change-tone",
            Intent::SelectEntity { .. } => "select-entity",
            Intent::SetLayoutMode { .. } => "set-layout-mode",
            Intent::ToggleResolvedIssue { .. } => "toggle-resolved-issue",
            Intent::CreateCustomEntity { .. } => "create-custom-entity",
            Intent::RenameEntity { .. } => "rename-entity",
            Intent::DeleteEntity { .. } => "delete-entity",
            Intent::AddLocale { .. } => "add-locale",
            Intent::EditVariant { .. } => "edit-variant",
            Intent::Generate => "generate",
            Intent::Export => "export",
            Intent::InsertIntoCanvas => "insert-into-canvas",
            Intent::RequestSyncToShared => "request-sync-to-shared",
            Intent::RequestPullFromShared => "request-pull-from-shared",
            Intent::ResolveConflict { .. } => "resolve-conflict",
            Intent::SetAutoSync { .. } => "set-auto-sync",
            Intent::SetActor { .. } => "set-actor",
        }
    }
}

/// Read-only view of the session published after every intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub state: ApplicationState,
    pub sync_status: SyncStatus,
    pub generation_stale: bool,
    pub library_hash: String,
}

impl StateSnapshot {
    pub fn capture(state: &ApplicationState) -> Result<Self, serde_json::Error> {
        Ok(Self {
            sync_status: classify(state)?,
            generation_stale: is_stale(state),
            library_hash: library_hash(&state.catalog, &state.custom_content)?,
            state: state.clone(),
        })
    }
}

/// Something the UI layer should show or act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Notification {
    State(Box<StateSnapshot>),
    /// Non-blocking, toast-style message.
    Advisory { message: String },
    Conflict(ConflictNotice),
    /// Generated content handed to the host for export.
    Exported { record: GeneratedContentRecord },
    /// Generated content handed to the renderer for placement.
    InsertRequested { record: GeneratedContentRecord },
}
