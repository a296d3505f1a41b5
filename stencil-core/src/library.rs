//! State mutations.
//!
//! Every mutation that can move the (entity, locale, tone) signature runs
//! through [`guarded`], which clears the generated record when the signature
//! changed. Nothing downstream has to re-detect staleness lazily.

use chrono::Utc;

use crate::catalog::stock_payload;
use crate::error::CoreError;
use crate::generated::current_signature;
use crate::state::ApplicationState;
use crate::types::{
    ContentPayload, ContentStatus, CustomEntityContent, EntityId, LayoutMode, Locale,
    TemplateInfo, Tone, VariantId, CUSTOM_ID_PREFIX, DEFAULT_VARIANT,
};

/// Run `mutate`, then drop the generated record if the signature moved.
fn guarded<T>(
    state: &mut ApplicationState,
    mutate: impl FnOnce(&mut ApplicationState) -> Result<T, CoreError>,
) -> Result<T, CoreError> {
    let before = current_signature(state);
    let out = mutate(state)?;
    if current_signature(state) != before && state.generated.take().is_some() {
        tracing::debug!("selection changed; cleared generated content");
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Selection, locale, tone
// ---------------------------------------------------------------------------

pub fn select_entity(state: &mut ApplicationState, id: &EntityId) -> Result<(), CoreError> {
    if state.entity(id).is_none() {
        return Err(CoreError::UnknownEntity(id.clone()));
    }
    guarded(state, |s| {
        s.selected_entity_id = Some(id.clone());
        Ok(())
    })
}

fn valid_locale(locale: &Locale) -> Result<(), CoreError> {
    if locale.is_valid() {
        Ok(())
    } else {
        Err(CoreError::InvalidLocale(locale.clone()))
    }
}

pub fn set_locale(state: &mut ApplicationState, locale: Locale) -> Result<(), CoreError> {
    valid_locale(&locale)?;
    guarded(state, |s| {
        s.locale = locale;
        Ok(())
    })
}

pub fn set_tone(state: &mut ApplicationState, tone: Tone) -> Result<(), CoreError> {
    guarded(state, |s| {
        s.tone = tone;
        Ok(())
    })
}

pub fn set_layout_mode(state: &mut ApplicationState, mode: LayoutMode) {
    state.layout_mode = mode;
}

/// Flip issue `index` between resolved and open for the session locale.
/// Returns whether it is now resolved.
pub fn toggle_resolved_issue(state: &mut ApplicationState, index: u32) -> bool {
    let issues = state.resolved_issues.entry(state.locale.clone()).or_default();
    let resolved = if issues.remove(&index) {
        false
    } else {
        issues.insert(index);
        true
    };
    if issues.is_empty() {
        state.resolved_issues.remove(&state.locale);
    }
    resolved
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

fn custom_entity<'a>(
    state: &'a mut ApplicationState,
    id: &EntityId,
) -> Result<&'a mut TemplateInfo, CoreError> {
    if !id.is_custom() {
        return Err(CoreError::NotCustom(id.clone()));
    }
    state
        .catalog
        .iter_mut()
        .find(|t| &t.id == id)
        .ok_or_else(|| CoreError::UnknownEntity(id.clone()))
}

fn next_custom_id(state: &ApplicationState) -> EntityId {
    let stamp = Utc::now().timestamp_millis();
    let mut candidate = EntityId::from(format!("{CUSTOM_ID_PREFIX}{stamp}"));
    let mut n = 1;
    while state.entity(&candidate).is_some() || state.custom_content.contains_key(&candidate) {
        n += 1;
        candidate = EntityId::from(format!("{CUSTOM_ID_PREFIX}{stamp}-{n}"));
    }
    candidate
}

/// Create a custom entity from `from` and select it.
///
/// Content is copied from the source's custom content when it has some;
/// otherwise a base locale is seeded with the stock variant, in the session
/// locale and tone.
pub fn create_custom_entity(
    state: &mut ApplicationState,
    from: &EntityId,
    name: String,
) -> Result<EntityId, CoreError> {
    let source = state
        .entity(from)
        .cloned()
        .ok_or_else(|| CoreError::UnknownEntity(from.clone()))?;
    valid_locale(&state.locale)?;
    let id = next_custom_id(state);

    let content = match state.custom_content.get(from) {
        Some(existing) => existing.clone(),
        None => {
            let mut variants = std::collections::BTreeMap::new();
            variants.insert(VariantId::from(DEFAULT_VARIANT), stock_payload(&source));
            CustomEntityContent::new(state.locale.clone(), state.tone, variants)
        }
    };

    state.catalog.push(TemplateInfo {
        id: id.clone(),
        name,
        category: source.category,
        description: source.description,
    });
    state.custom_content.insert(id.clone(), content);
    tracing::info!("created custom entity '{id}' from '{from}'");

    select_entity(state, &id)?;
    Ok(id)
}

pub fn rename_entity(
    state: &mut ApplicationState,
    id: &EntityId,
    name: String,
) -> Result<(), CoreError> {
    custom_entity(state, id)?.name = name;
    Ok(())
}

/// Remove a custom entity and its content. Deleting the selection reselects
/// the first catalog entry, or nothing when the catalog is empty.
pub fn delete_entity(state: &mut ApplicationState, id: &EntityId) -> Result<(), CoreError> {
    custom_entity(state, id)?;
    guarded(state, |s| {
        s.catalog.retain(|t| &t.id != id);
        s.custom_content.remove(id);
        s.repair_selection();
        Ok(())
    })?;
    tracing::info!("deleted custom entity '{id}'");
    Ok(())
}

// ---------------------------------------------------------------------------
// Custom content
// ---------------------------------------------------------------------------

fn content_mut<'a>(
    state: &'a mut ApplicationState,
    id: &EntityId,
) -> Result<&'a mut CustomEntityContent, CoreError> {
    custom_entity(state, id)?;
    state
        .custom_content
        .get_mut(id)
        .ok_or_else(|| CoreError::UnknownEntity(id.clone()))
}

/// Add `locale` to a custom entity as an `auto` copy of the base locale.
pub fn add_locale(
    state: &mut ApplicationState,
    id: &EntityId,
    locale: Locale,
) -> Result<(), CoreError> {
    valid_locale(&locale)?;
    guarded(state, |s| {
        let content = content_mut(s, id)?;
        if content.locales.contains_key(&locale) {
            return Err(CoreError::DuplicateLocale {
                entity: id.clone(),
                locale,
            });
        }
        let mut copy = content.base().cloned().ok_or_else(|| CoreError::UnknownLocale {
            entity: id.clone(),
            locale: content.base_locale.clone(),
        })?;
        copy.status = ContentStatus::Auto;
        content.locales.insert(locale, copy);
        Ok(())
    })
}

/// Set one variant of one locale. The locale becomes `custom`. Editing the
/// base locale re-propagates its variants into every `auto` locale when
/// `settings.auto_propagate` is on.
pub fn edit_variant(
    state: &mut ApplicationState,
    id: &EntityId,
    locale: &Locale,
    variant: VariantId,
    payload: ContentPayload,
) -> Result<(), CoreError> {
    let propagate = state.settings.auto_propagate;
    let content = content_mut(state, id)?;
    let entry = content
        .locales
        .get_mut(locale)
        .ok_or_else(|| CoreError::UnknownLocale {
            entity: id.clone(),
            locale: locale.clone(),
        })?;
    entry.variants.insert(variant, payload);
    entry.status = ContentStatus::Custom;

    if propagate && locale == &content.base_locale {
        propagate_base(content);
    }
    Ok(())
}

/// Copy the base variants into every `auto` locale. Returns how many were updated.
pub fn propagate_base(content: &mut CustomEntityContent) -> usize {
    let Some(base) = content.base().map(|b| b.variants.clone()) else {
        return 0;
    };
    let mut updated = 0;
    for (locale, entry) in content.locales.iter_mut() {
        if locale == &content.base_locale || entry.status != ContentStatus::Auto {
            continue;
        }
        entry.variants = base.clone();
        updated += 1;
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generated::{generate, is_stale, source_variants};

    fn with_generation() -> ApplicationState {
        let mut state = ApplicationState::default();
        let variants = source_variants(&state).unwrap();
        generate(&mut state, variants).unwrap();
        assert!(!is_stale(&state));
        state
    }

    fn payload(subject: &str) -> ContentPayload {
        ContentPayload {
            subject: subject.into(),
            ..ContentPayload::default()
        }
    }

    #[test]
    fn changing_locale_tone_or_selection_clears_generation() {
        let mut state = with_generation();
        set_locale(&mut state, Locale::from("fr")).unwrap();
        assert!(state.generated.is_none());

        let mut state = with_generation();
        set_tone(&mut state, Tone::Formal).unwrap();
        assert!(state.generated.is_none());

        let mut state = with_generation();
        let other = state.catalog[1].id.clone();
        select_entity(&mut state, &other).unwrap();
        assert!(state.generated.is_none());
    }

    #[test]
    fn no_op_mutation_keeps_generation() {
        let mut state = with_generation();
        let same = state.tone;
        set_tone(&mut state, same).unwrap();
        assert!(state.generated.is_some());
        set_layout_mode(&mut state, LayoutMode::SideBySide);
        assert!(state.generated.is_some());
    }

    #[test]
    fn selecting_unknown_entity_fails() {
        let mut state = ApplicationState::default();
        let err = select_entity(&mut state, &EntityId::from("nope")).unwrap_err();
        assert!(matches!(err, CoreError::UnknownEntity(_)));
    }

    #[test]
    fn blank_locales_are_rejected_without_change() {
        let mut state = with_generation();
        let before = state.clone();
        for blank in ["", "   "] {
            let err = set_locale(&mut state, Locale::from(blank)).unwrap_err();
            assert!(matches!(err, CoreError::InvalidLocale(_)));
        }
        assert_eq!(state, before);

        let from = state.catalog[0].id.clone();
        let id = create_custom_entity(&mut state, &from, "Mine".into()).unwrap();
        let err = add_locale(&mut state, &id, Locale::from(" ")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidLocale(_)));
        assert_eq!(state.custom_content[&id].locales.len(), 1);
    }

    #[test]
    fn create_from_system_template_seeds_base_locale() {
        let mut state = ApplicationState::default();
        state.locale = Locale::from("de");
        let from = state.catalog[0].id.clone();
        let id = create_custom_entity(&mut state, &from, "My welcome".into()).unwrap();

        assert!(id.is_custom());
        assert_eq!(state.selected_entity_id.as_ref(), Some(&id));
        let content = &state.custom_content[&id];
        assert_eq!(content.base_locale, Locale::from("de"));
        assert!(content.base().unwrap().variants.contains_key(&VariantId::from(DEFAULT_VARIANT)));
    }

    #[test]
    fn created_ids_do_not_collide() {
        let mut state = ApplicationState::default();
        let from = state.catalog[0].id.clone();
        let a = create_custom_entity(&mut state, &from, "A".into()).unwrap();
        let b = create_custom_entity(&mut state, &from, "B".into()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn system_templates_are_immutable() {
        let mut state = ApplicationState::default();
        let id = state.catalog[0].id.clone();
        assert!(matches!(
            rename_entity(&mut state, &id, "x".into()),
            Err(CoreError::NotCustom(_))
        ));
        assert!(matches!(delete_entity(&mut state, &id), Err(CoreError::NotCustom(_))));
    }

    #[test]
    fn deleting_selected_entity_reselects_first() {
        let mut state = ApplicationState::default();
        let from = state.catalog[0].id.clone();
        let id = create_custom_entity(&mut state, &from, "Temp".into()).unwrap();
        let variants = source_variants(&state).unwrap();
        generate(&mut state, variants).unwrap();

        delete_entity(&mut state, &id).unwrap();
        assert_eq!(state.selected_entity_id, Some(from));
        assert!(!state.custom_content.contains_key(&id));
        assert!(state.generated.is_none());
    }

    #[test]
    fn base_edit_propagates_to_auto_locales_only() {
        let mut state = ApplicationState::default();
        let from = state.catalog[0].id.clone();
        let id = create_custom_entity(&mut state, &from, "Mine".into()).unwrap();
        add_locale(&mut state, &id, Locale::from("de")).unwrap();
        add_locale(&mut state, &id, Locale::from("fr")).unwrap();

        let fr = Locale::from("fr");
        edit_variant(&mut state, &id, &fr, VariantId::from("default"), payload("Bonjour")).unwrap();

        let en = Locale::from("en");
        edit_variant(&mut state, &id, &en, VariantId::from("default"), payload("Hello")).unwrap();

        let content = &state.custom_content[&id];
        let de = &content.locales[&Locale::from("de")];
        assert_eq!(de.status, ContentStatus::Auto);
        assert_eq!(de.variants[&VariantId::from("default")].subject, "Hello");
        let fr = &content.locales[&fr];
        assert_eq!(fr.status, ContentStatus::Custom);
        assert_eq!(fr.variants[&VariantId::from("default")].subject, "Bonjour");
    }

    #[test]
    fn duplicate_locale_is_rejected() {
        let mut state = ApplicationState::default();
        let from = state.catalog[0].id.clone();
        let id = create_custom_entity(&mut state, &from, "Mine".into()).unwrap();
        let err = add_locale(&mut state, &id, Locale::from("en")).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateLocale { .. }));
    }

    #[test]
    fn toggling_issue_twice_clears_locale_entry() {
        let mut state = ApplicationState::default();
        assert!(toggle_resolved_issue(&mut state, 3));
        assert!(state.resolved_issues[&Locale::from("en")].contains(&3));
        assert!(!toggle_resolved_issue(&mut state, 3));
        assert!(state.resolved_issues.is_empty());
    }
}
