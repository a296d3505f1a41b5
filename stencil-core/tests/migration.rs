//! Migration round-trip and legacy-shape integration tests.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{TimeZone, Utc};
use rstest::rstest;
use serde_json::{json, Value};
use stencil_core::{
    catalog::builtin_catalog, migrate, migrate_with_report, ContentPayload, ContentStatus,
    CustomEntityContent, EntityId, LayoutMode, Locale, LocaleContent, PersistedRecord, Settings,
    SyncMeta, TemplateInfo, Tone, VariantId, CURRENT_SCHEMA_VERSION,
};

fn payload(subject: &str, cta: Option<&str>) -> ContentPayload {
    ContentPayload {
        subject: subject.into(),
        preheader: format!("{subject} preheader"),
        body: format!("{subject} body"),
        cta: cta.map(str::to_owned),
    }
}

fn rich_record() -> PersistedRecord {
    let custom_id = EntityId::from("custom-1700000000000");
    let mut catalog = builtin_catalog();
    catalog.push(TemplateInfo {
        id: custom_id.clone(),
        name: "Spring sale".into(),
        category: "marketing".into(),
        description: Some("Seasonal".into()),
    });

    let mut variants = BTreeMap::new();
    variants.insert(VariantId::from("short"), payload("Sale", Some("Shop")));
    variants.insert(VariantId::from("long"), payload("Big sale", None));
    let mut content = CustomEntityContent::new(Locale::from("en"), Tone::Playful, variants.clone());
    content.locales.insert(
        Locale::from("de"),
        LocaleContent {
            tone: Tone::Playful,
            variants,
            status: ContentStatus::Auto,
        },
    );

    let mut custom_content = BTreeMap::new();
    custom_content.insert(custom_id.clone(), content);

    let mut resolved = BTreeMap::new();
    resolved.insert(Locale::from("de"), BTreeSet::from([0, 4, 9]));

    PersistedRecord {
        schema_version: CURRENT_SCHEMA_VERSION,
        locale: Locale::from("de"),
        tone: Tone::Playful,
        layout_mode: LayoutMode::SideBySide,
        selected_entity_id: Some(custom_id),
        catalog,
        custom_content,
        resolved_issues: resolved,
        settings: Settings {
            auto_sync: true,
            auto_propagate: false,
            actor: Some("Dana".into()),
        },
        sync_meta: SyncMeta {
            last_synced_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()),
            last_synced_by: Some("Dana".into()),
            last_synced_remote_hash: Some("ab".repeat(32)),
        },
    }
}

fn empty_catalog_record() -> PersistedRecord {
    PersistedRecord {
        selected_entity_id: None,
        catalog: Vec::new(),
        ..PersistedRecord::default()
    }
}

#[rstest]
#[case::defaults(PersistedRecord::default())]
#[case::rich(rich_record())]
#[case::empty_catalog(empty_catalog_record())]
fn valid_records_survive_a_round_trip(#[case] record: PersistedRecord) {
    let serialized = serde_json::to_string(&record).expect("serialize");
    let raw: Value = serde_json::from_str(&serialized).expect("parse");
    let migrated = migrate_with_report(&raw);
    assert!(migrated.report.is_clean(), "report: {:?}", migrated.report);
    assert_eq!(migrated.record, record);
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
#[case(CURRENT_SCHEMA_VERSION + 1)]
#[case(u32::MAX)]
fn other_versions_reset_to_default(#[case] version: u32) {
    let mut raw = serde_json::to_value(rich_record()).expect("to_value");
    raw["schemaVersion"] = json!(version);
    assert_eq!(migrate(&raw), PersistedRecord::default());
}

#[test]
fn legacy_by_locale_shape_keeps_base_and_both_locales() {
    let raw = json!({
        "schemaVersion": CURRENT_SCHEMA_VERSION,
        "catalog": [{"id": "custom-1", "name": "Legacy"}],
        "selectedEntityId": "custom-1",
        "customContent": {
            "custom-1": {
                "locale": "en",
                "tone": "formal",
                "variants": {"short": {"subject": "Hello"}},
                "byLocale": {
                    "de": {"variants": {"short": {"subject": "Hallo"}}},
                    "fr": {
                        "tone": "friendly",
                        "variants": {"short": {"subject": "Salut"}},
                        "status": "custom"
                    }
                }
            }
        }
    });

    let migrated = migrate_with_report(&raw);
    assert!(migrated.report.is_clean());
    assert_eq!(migrated.report.upgraded, vec![EntityId::from("custom-1")]);

    let content = &migrated.record.custom_content[&EntityId::from("custom-1")];
    assert_eq!(content.base_locale, Locale::from("en"));
    let keys: Vec<_> = content.locales.keys().map(|l| l.0.as_str()).collect();
    assert_eq!(keys, vec!["de", "en", "fr"]);

    let en = &content.locales[&Locale::from("en")];
    assert_eq!(en.status, ContentStatus::Custom);
    assert_eq!(en.tone, Tone::Formal);

    let de = &content.locales[&Locale::from("de")];
    assert_eq!(de.status, ContentStatus::Auto, "copy-propagated entry");
    assert_eq!(de.tone, Tone::Formal, "inherits the base tone");
    assert_eq!(de.variants[&VariantId::from("short")].subject, "Hallo");

    let fr = &content.locales[&Locale::from("fr")];
    assert_eq!(fr.status, ContentStatus::Custom);
    assert_eq!(fr.tone, Tone::Friendly);
}

#[test]
fn migrated_legacy_record_is_stable_on_second_pass() {
    let raw = json!({
        "schemaVersion": CURRENT_SCHEMA_VERSION,
        "customContent": {
            "custom-9": {"locale": "es", "tone": "neutral", "variants": {}}
        }
    });
    let first = migrate(&raw);
    let second = migrate(&serde_json::to_value(&first).expect("to_value"));
    assert_eq!(first, second);
}
