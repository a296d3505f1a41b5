//! Domain types for the stencil template library.
//!
//! Every type serializes to the camelCase JSON shape the host stores, and
//! every map is a `BTreeMap` so serialization order never depends on hashing.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Id prefix that marks a user-created entity.
pub const CUSTOM_ID_PREFIX: &str = "custom-";

/// Locale used when nothing else is known.
pub const DEFAULT_LOCALE: &str = "en";

/// Variant id seeded into freshly created entities.
pub const DEFAULT_VARIANT: &str = "default";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of a template-like entity in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// User-created entities are the only ones with mutable per-locale content.
    pub fn is_custom(&self) -> bool {
        self.0.starts_with(CUSTOM_ID_PREFIX)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A locale tag such as `en` or `de-AT`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locale(pub String);

impl Locale {
    pub fn is_valid(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self(DEFAULT_LOCALE.to_owned())
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Locale {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Locale {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of a content variant inside a locale (e.g. `short`, `long`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantId(pub String);

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for VariantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VariantId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Voice used for generated copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Neutral,
    Formal,
    Friendly,
    Playful,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tone::Neutral => write!(f, "neutral"),
            Tone::Formal => write!(f, "formal"),
            Tone::Friendly => write!(f, "friendly"),
            Tone::Playful => write!(f, "playful"),
        }
    }
}

/// How previews are arranged by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutMode {
    #[default]
    Stacked,
    SideBySide,
}

/// Whether a locale entry was written by a human or copied from the base locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Auto,
    #[default]
    Custom,
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

/// The copy of one email variant. Opaque to everything but the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContentPayload {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub preheader: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cta: Option<String>,
}

/// All variants of an entity for one locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocaleContent {
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub variants: BTreeMap<VariantId, ContentPayload>,
    #[serde(default)]
    pub status: ContentStatus,
}

/// Per-locale content of a user-created entity.
///
/// `locales[base_locale]` always exists; constructors and the migrator
/// refuse to produce a value without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomEntityContent {
    pub base_locale: Locale,
    pub locales: BTreeMap<Locale, LocaleContent>,
}

impl CustomEntityContent {
    /// Create content holding only the base locale, marked `custom`.
    pub fn new(base_locale: Locale, tone: Tone, variants: BTreeMap<VariantId, ContentPayload>) -> Self {
        let mut locales = BTreeMap::new();
        locales.insert(
            base_locale.clone(),
            LocaleContent {
                tone,
                variants,
                status: ContentStatus::Custom,
            },
        );
        Self {
            base_locale,
            locales,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.base_locale.is_valid() && self.locales.contains_key(&self.base_locale)
    }

    pub fn base(&self) -> Option<&LocaleContent> {
        self.locales.get(&self.base_locale)
    }

    /// The locale actually shown for `wanted`: itself when present, else the base.
    pub fn effective_locale<'a>(&'a self, wanted: &'a Locale) -> &'a Locale {
        if self.locales.contains_key(wanted) {
            wanted
        } else {
            &self.base_locale
        }
    }
}

/// Catalog entry for a template-like entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInfo {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Resolved review-issue indices, per locale.
pub type ResolvedIssues = BTreeMap<Locale, BTreeSet<u32>>;

// ---------------------------------------------------------------------------
// Settings and sync bookkeeping
// ---------------------------------------------------------------------------

/// User-adjustable settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Push library edits to the shared document after a quiet period.
    pub auto_sync: bool,
    /// Copy base-locale edits into `auto` locales.
    pub auto_propagate: bool,
    /// Display name written as `updatedBy` on shared snapshots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_sync: false,
            auto_propagate: true,
            actor: None,
        }
    }
}

/// Bookkeeping from the last successful exchange with the shared document.
///
/// Drives UI status only; conflict decisions compare snapshot timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_remote_hash: Option<String>,
}

/// A newer shared snapshot was found where this session expected its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictNotice {
    pub remote_updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_updated_by: Option<String>,
}

// ---------------------------------------------------------------------------
// Generated content
// ---------------------------------------------------------------------------

/// Cached output of the last `generate` intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedContentRecord {
    pub entity_id: EntityId,
    pub locale: Locale,
    pub tone: Tone,
    pub variants: BTreeMap<VariantId, ContentPayload>,
    pub generated_at: DateTime<Utc>,
    pub signature: String,
}

/// What the last export-like consumer did with the generated record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExportStatus {
    Exported { entity_id: EntityId, at: DateTime<Utc> },
    Inserted { entity_id: EntityId, at: DateTime<Utc> },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
