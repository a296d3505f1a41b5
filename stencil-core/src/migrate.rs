//! Schema migration for persisted blobs.
//!
//! ## Rules
//!
//! 1. Non-object input, a missing `schemaVersion`, or a version other than
//!    [`CURRENT_SCHEMA_VERSION`] resets to [`PersistedRecord::default`].
//! 2. With a matching version every field is validated on its own; a field
//!    that fails falls back to its default and the rest are kept.
//! 3. Custom content entries are normalized from either legacy shape into
//!    [`CustomEntityContent`]; entries that fit no shape are dropped.
//! 4. The selection is repaired to point into the catalog.
//!
//! Migration never fails.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::catalog::builtin_catalog;
use crate::state::{PersistedRecord, CURRENT_SCHEMA_VERSION};
use crate::types::{
    ContentPayload, ContentStatus, CustomEntityContent, EntityId, LayoutMode, Locale,
    LocaleContent, ResolvedIssues, Settings, SyncMeta, TemplateInfo, Tone, VariantId,
};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Why a blob was discarded wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetReason {
    NotAnObject,
    MissingVersion,
    VersionMismatch { found: Value },
    /// The host could not read the stored blob at all.
    ReadFailed { error: String },
}

/// What migration had to repair. A clean report means the blob was trusted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MigrationReport {
    pub reset: Option<ResetReason>,
    /// Fields present but invalid, replaced by their defaults.
    pub defaulted: Vec<&'static str>,
    /// Custom content entries that matched no known shape.
    pub dropped: Vec<EntityId>,
    /// Custom content entries upgraded from a legacy shape.
    pub upgraded: Vec<EntityId>,
    /// Legacy entries upgraded with some of their locales discarded.
    pub partial: Vec<EntityId>,
}

impl MigrationReport {
    /// True when nothing the user stored was lost. Upgrades lose nothing.
    pub fn is_clean(&self) -> bool {
        self.reset.is_none()
            && self.defaulted.is_empty()
            && self.dropped.is_empty()
            && self.partial.is_empty()
    }

    /// One-line description suitable for an advisory.
    pub fn summary(&self) -> String {
        if let Some(reason) = &self.reset {
            return match reason {
                ResetReason::NotAnObject => "saved state was unreadable; defaults restored".into(),
                ResetReason::MissingVersion => {
                    "saved state had no schema version; defaults restored".into()
                }
                ResetReason::VersionMismatch { found } => format!(
                    "saved state uses schema {found}, expected {CURRENT_SCHEMA_VERSION}; defaults restored"
                ),
                ResetReason::ReadFailed { error } => {
                    format!("saved state could not be read ({error}); using defaults")
                }
            };
        }
        let mut parts = Vec::new();
        if !self.defaulted.is_empty() {
            parts.push(format!("reset {}", self.defaulted.join(", ")));
        }
        if !self.dropped.is_empty() {
            parts.push(format!(
                "dropped unreadable content for {} template(s)",
                self.dropped.len()
            ));
        }
        if !self.partial.is_empty() {
            parts.push(format!(
                "discarded unreadable locales of {} template(s)",
                self.partial.len()
            ));
        }
        if parts.is_empty() {
            "saved state loaded".into()
        } else {
            format!("saved state repaired: {}", parts.join("; "))
        }
    }
}

/// A migrated record together with what was repaired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migrated {
    pub record: PersistedRecord,
    pub report: MigrationReport,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Convert any blob into a valid current-schema record.
pub fn migrate(raw: &Value) -> PersistedRecord {
    migrate_with_report(raw).record
}

/// [`migrate`], also returning what had to be repaired.
pub fn migrate_with_report(raw: &Value) -> Migrated {
    let Some(obj) = raw.as_object() else {
        return reset(ResetReason::NotAnObject);
    };
    match obj.get("schemaVersion") {
        None => return reset(ResetReason::MissingVersion),
        Some(v) if v.as_u64() != Some(u64::from(CURRENT_SCHEMA_VERSION)) => {
            return reset(ResetReason::VersionMismatch { found: v.clone() });
        }
        Some(_) => {}
    }

    let mut report = MigrationReport::default();
    let defaults = PersistedRecord::default();

    let locale = field(obj, "locale", &mut report, Locale::is_valid).unwrap_or(defaults.locale);
    let tone = field::<Tone>(obj, "tone", &mut report, |_| true).unwrap_or(defaults.tone);
    let layout_mode =
        field::<LayoutMode>(obj, "layoutMode", &mut report, |_| true).unwrap_or(defaults.layout_mode);
    let catalog = field(obj, "catalog", &mut report, |c: &Vec<TemplateInfo>| {
        catalog_is_valid(c)
    })
    .unwrap_or_else(builtin_catalog);
    let selected_entity_id =
        field::<Option<EntityId>>(obj, "selectedEntityId", &mut report, |_| true)
            .unwrap_or(defaults.selected_entity_id);
    let resolved_issues = field::<ResolvedIssues>(obj, "resolvedIssues", &mut report, |issues| {
        issues.keys().all(Locale::is_valid)
    })
    .unwrap_or_default();
    let settings = field::<Settings>(obj, "settings", &mut report, |_| true).unwrap_or_default();
    let sync_meta = field::<SyncMeta>(obj, "syncMeta", &mut report, |_| true).unwrap_or_default();
    let custom_content = custom_content_field(obj, &mut report);

    let mut record = PersistedRecord {
        schema_version: CURRENT_SCHEMA_VERSION,
        locale,
        tone,
        layout_mode,
        selected_entity_id,
        catalog,
        custom_content,
        resolved_issues,
        settings,
        sync_meta,
    };

    let selection_valid = record
        .selected_entity_id
        .as_ref()
        .map_or(true, |id| record.catalog.iter().any(|t| &t.id == id));
    if !selection_valid {
        tracing::warn!("selected entity is not in the catalog; selecting the first entry");
        record.selected_entity_id = record.catalog.first().map(|t| t.id.clone());
        report.defaulted.push("selectedEntityId");
    }

    Migrated { record, report }
}

fn reset(reason: ResetReason) -> Migrated {
    tracing::warn!("discarding persisted state: {reason:?}");
    Migrated {
        record: PersistedRecord::default(),
        report: MigrationReport {
            reset: Some(reason),
            ..MigrationReport::default()
        },
    }
}

/// Deserialize one field. Missing fields default silently; present but
/// invalid fields default and are reported.
fn field<T: DeserializeOwned>(
    obj: &Map<String, Value>,
    name: &'static str,
    report: &mut MigrationReport,
    valid: impl Fn(&T) -> bool,
) -> Option<T> {
    let raw = obj.get(name)?;
    match serde_json::from_value::<T>(raw.clone()) {
        Ok(value) if valid(&value) => Some(value),
        Ok(_) => {
            tracing::warn!("persisted field '{name}' failed validation; using default");
            report.defaulted.push(name);
            None
        }
        Err(err) => {
            tracing::warn!("persisted field '{name}' has the wrong shape ({err}); using default");
            report.defaulted.push(name);
            None
        }
    }
}

fn catalog_is_valid(catalog: &[TemplateInfo]) -> bool {
    let mut seen = BTreeSet::new();
    catalog
        .iter()
        .all(|t| !t.id.0.is_empty() && seen.insert(&t.id))
}

// ---------------------------------------------------------------------------
// Custom content shapes
// ---------------------------------------------------------------------------

/// Every shape custom content has been stored in. Resolved once, here.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CustomContentCompat {
    Current(CustomEntityContent),
    LegacyByLocale(LegacyByLocale),
    Legacy(LegacySingle),
}

/// `{locale, tone, variants}`: one locale, no per-locale status.
#[derive(Debug, Deserialize)]
struct LegacySingle {
    locale: Locale,
    #[serde(default)]
    tone: Tone,
    variants: BTreeMap<VariantId, ContentPayload>,
}

/// `{locale, tone, variants, byLocale}`: base locale inline, others nested.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyByLocale {
    locale: Locale,
    #[serde(default)]
    tone: Tone,
    variants: BTreeMap<VariantId, ContentPayload>,
    by_locale: BTreeMap<Locale, LegacyLocaleEntry>,
}

#[derive(Debug, Deserialize)]
struct LegacyLocaleEntry {
    #[serde(default)]
    tone: Option<Tone>,
    #[serde(default)]
    variants: BTreeMap<VariantId, ContentPayload>,
    #[serde(default)]
    status: Option<ContentStatus>,
}

/// How a stored custom content entry reached the current shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalized {
    Current,
    Upgraded,
    /// Upgraded, but some per-locale entries could not be read.
    Partial,
}

impl CustomContentCompat {
    /// `had_by_locale`: the raw entry carried a `byLocale` map.
    fn into_current(self, had_by_locale: bool) -> (CustomEntityContent, Normalized) {
        match self {
            CustomContentCompat::Current(content) => (content, Normalized::Current),
            CustomContentCompat::Legacy(single) => (
                CustomEntityContent::new(single.locale, single.tone, single.variants),
                if had_by_locale {
                    Normalized::Partial
                } else {
                    Normalized::Upgraded
                },
            ),
            CustomContentCompat::LegacyByLocale(legacy) => {
                let base_tone = legacy.tone;
                let mut content =
                    CustomEntityContent::new(legacy.locale, legacy.tone, legacy.variants);
                let mut shape = Normalized::Upgraded;
                for (locale, entry) in legacy.by_locale {
                    if locale == content.base_locale {
                        continue;
                    }
                    if !locale.is_valid() {
                        shape = Normalized::Partial;
                        continue;
                    }
                    content.locales.insert(
                        locale,
                        LocaleContent {
                            tone: entry.tone.unwrap_or(base_tone),
                            variants: entry.variants,
                            status: entry.status.unwrap_or(ContentStatus::Auto),
                        },
                    );
                }
                (content, shape)
            }
        }
    }
}

/// Normalize one stored custom content entry. `None` when no shape fits.
pub fn normalize_custom_content(raw: &Value) -> Option<(CustomEntityContent, Normalized)> {
    let compat = serde_json::from_value::<CustomContentCompat>(raw.clone()).ok()?;
    let (content, shape) = compat.into_current(raw.get("byLocale").is_some());
    content.is_valid().then_some((content, shape))
}

fn custom_content_field(
    obj: &Map<String, Value>,
    report: &mut MigrationReport,
) -> BTreeMap<EntityId, CustomEntityContent> {
    let mut out = BTreeMap::new();
    let Some(raw) = obj.get("customContent") else {
        return out;
    };
    let Some(entries) = raw.as_object() else {
        tracing::warn!("persisted field 'customContent' is not an object; using default");
        report.defaulted.push("customContent");
        return out;
    };
    for (id, entry) in entries {
        let id = EntityId::from(id.as_str());
        match normalize_custom_content(entry) {
            Some((content, shape)) => {
                match shape {
                    Normalized::Current => {}
                    Normalized::Upgraded => {
                        tracing::info!("upgraded legacy custom content for '{id}'");
                        report.upgraded.push(id.clone());
                    }
                    Normalized::Partial => {
                        tracing::warn!("upgraded custom content for '{id}' lost unreadable locales");
                        report.partial.push(id.clone());
                    }
                }
                out.insert(id, content);
            }
            None => {
                tracing::warn!("dropping unreadable custom content for '{id}'");
                report.dropped.push(id);
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn current(extra: Value) -> Value {
        let mut base = serde_json::to_value(PersistedRecord::default()).unwrap();
        if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        base
    }

    #[rstest]
    #[case(json!(null))]
    #[case(json!("state"))]
    #[case(json!([1, 2, 3]))]
    #[case(json!({"locale": "de"}))]
    #[case(json!({"schemaVersion": 2, "locale": "de"}))]
    #[case(json!({"schemaVersion": "3", "locale": "de"}))]
    #[case(json!({"schemaVersion": 4, "locale": "de"}))]
    fn untrusted_blobs_reset_to_defaults(#[case] raw: Value) {
        let migrated = migrate_with_report(&raw);
        assert_eq!(migrated.record, PersistedRecord::default());
        assert!(migrated.report.reset.is_some());
        assert!(!migrated.report.is_clean());
    }

    #[rstest]
    #[case("locale", json!(42))]
    #[case("locale", json!("  "))]
    #[case("tone", json!("shouty"))]
    #[case("layoutMode", json!({"grid": true}))]
    #[case("catalog", json!("not-a-list"))]
    #[case("resolvedIssues", json!({"en": ["x"]}))]
    #[case("settings", json!("on"))]
    #[case("syncMeta", json!({"lastSyncedAt": "yesterday"}))]
    fn invalid_field_defaults_alone(#[case] name: &'static str, #[case] bad: Value) {
        let raw = current(json!({ "tone": "formal", name: bad }));
        let migrated = migrate_with_report(&raw);
        assert_eq!(migrated.report.defaulted, vec![name]);
        if name != "tone" {
            assert_eq!(migrated.record.tone, Tone::Formal, "valid fields survive");
        }
    }

    #[test]
    fn duplicate_catalog_ids_reset_catalog() {
        let raw = current(json!({
            "catalog": [{"id": "a", "name": "A"}, {"id": "a", "name": "B"}],
            "selectedEntityId": "a",
        }));
        let migrated = migrate_with_report(&raw);
        assert_eq!(migrated.record.catalog, builtin_catalog());
        assert!(migrated.report.defaulted.contains(&"catalog"));
        assert!(migrated.report.defaulted.contains(&"selectedEntityId"));
    }

    #[test]
    fn missing_fields_default_silently() {
        let migrated = migrate_with_report(&json!({"schemaVersion": CURRENT_SCHEMA_VERSION}));
        assert!(migrated.report.is_clean());
        assert_eq!(migrated.record, PersistedRecord::default());
    }

    #[test]
    fn legacy_single_shape_becomes_base_locale() {
        let raw = json!({
            "locale": "de",
            "tone": "friendly",
            "variants": {"short": {"subject": "Hallo"}},
        });
        let (content, shape) = normalize_custom_content(&raw).expect("normalizes");
        assert_eq!(shape, Normalized::Upgraded);
        assert_eq!(content.base_locale, Locale::from("de"));
        let base = content.base().expect("base");
        assert_eq!(base.tone, Tone::Friendly);
        assert_eq!(base.status, ContentStatus::Custom);
        assert_eq!(base.variants[&VariantId::from("short")].subject, "Hallo");
    }

    #[test]
    fn current_shape_without_base_is_dropped() {
        let raw = json!({
            "baseLocale": "en",
            "locales": {"de": {"tone": "neutral", "variants": {}, "status": "auto"}},
        });
        assert!(normalize_custom_content(&raw).is_none());
    }

    #[rstest]
    #[case(json!(7))]
    #[case(json!({"variants": {}}))]
    #[case(json!({"locale": "en", "variants": "nope"}))]
    fn unknown_custom_shapes_are_dropped(#[case] raw: Value) {
        assert!(normalize_custom_content(&raw).is_none());
    }

    #[test]
    fn dropped_entries_do_not_affect_siblings() {
        let raw = current(json!({
            "customContent": {
                "custom-ok": {"locale": "en", "variants": {}},
                "custom-bad": {"nonsense": true},
            }
        }));
        let migrated = migrate_with_report(&raw);
        assert!(migrated.record.custom_content.contains_key(&EntityId::from("custom-ok")));
        assert!(!migrated.record.custom_content.contains_key(&EntityId::from("custom-bad")));
        assert_eq!(migrated.report.dropped, vec![EntityId::from("custom-bad")]);
        assert_eq!(migrated.report.upgraded, vec![EntityId::from("custom-ok")]);
    }

    #[test]
    fn malformed_by_locale_keeps_base_and_is_reported() {
        let raw = current(json!({
            "customContent": {
                "custom-1": {
                    "locale": "en",
                    "variants": {"short": {"subject": "Hi"}},
                    "byLocale": {"de": {"variants": "broken"}},
                },
            }
        }));
        let migrated = migrate_with_report(&raw);
        let content = &migrated.record.custom_content[&EntityId::from("custom-1")];
        assert_eq!(content.locales.len(), 1);
        assert_eq!(migrated.report.partial, vec![EntityId::from("custom-1")]);
        assert!(migrated.report.upgraded.is_empty());
        assert!(!migrated.report.is_clean());
        assert!(migrated.report.summary().contains("locales"));
    }

    #[test]
    fn report_summary_mentions_version() {
        let migrated = migrate_with_report(&json!({"schemaVersion": 1}));
        assert!(migrated.report.summary().contains("schema 1"));
    }
}
