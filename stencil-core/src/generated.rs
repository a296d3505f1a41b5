//! Generated-content cache.
//!
//! A single [`GeneratedContentRecord`] lives on the state. It is keyed by a
//! signature of (selected entity, effective locale, tone). Mutations that
//! change any of those clear the record on the spot (see [`crate::library`]);
//! consumers still re-check with [`require_fresh`] before acting.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::catalog::stock_payload;
use crate::error::CoreError;
use crate::state::ApplicationState;
use crate::types::{ContentPayload, GeneratedContentRecord, VariantId, DEFAULT_VARIANT};

/// Signature of the live selection: `<entity>::<locale>::<tone>`.
///
/// With no selection the entity part is empty.
pub fn current_signature(state: &ApplicationState) -> String {
    let entity = state
        .selected_entity_id
        .as_ref()
        .map(|id| id.0.as_str())
        .unwrap_or_default();
    format!("{entity}::{}::{}", state.effective_locale(), state.tone)
}

/// True when there is no record, or the record was made for another selection.
pub fn is_stale(state: &ApplicationState) -> bool {
    match &state.generated {
        Some(record) => record.signature != current_signature(state),
        None => true,
    }
}

/// The record, if it still matches the live selection.
pub fn require_fresh(state: &ApplicationState) -> Result<&GeneratedContentRecord, CoreError> {
    let record = state.generated.as_ref().ok_or(CoreError::NoGeneration)?;
    let expected = current_signature(state);
    if record.signature != expected {
        return Err(CoreError::StaleGeneration {
            expected,
            found: record.signature.clone(),
        });
    }
    Ok(record)
}

/// Variants to generate from: the selected custom entity's content at the
/// effective locale, or a stock variant for system templates.
pub fn source_variants(
    state: &ApplicationState,
) -> Result<BTreeMap<VariantId, ContentPayload>, CoreError> {
    let id = state.selected_entity_id.as_ref().ok_or(CoreError::NoSelection)?;
    let info = state
        .entity(id)
        .ok_or_else(|| CoreError::UnknownEntity(id.clone()))?;

    if let Some(content) = state.custom_content.get(id) {
        let locale = content.effective_locale(&state.locale);
        if let Some(entry) = content.locales.get(locale) {
            return Ok(entry.variants.clone());
        }
    }

    let mut variants = BTreeMap::new();
    variants.insert(VariantId::from(DEFAULT_VARIANT), stock_payload(info));
    Ok(variants)
}

/// Store a new record for the live selection and return it.
pub fn generate(
    state: &mut ApplicationState,
    variants: BTreeMap<VariantId, ContentPayload>,
) -> Result<&GeneratedContentRecord, CoreError> {
    let entity_id = state
        .selected_entity_id
        .clone()
        .ok_or(CoreError::NoSelection)?;
    let record = GeneratedContentRecord {
        entity_id,
        locale: state.effective_locale(),
        tone: state.tone,
        variants,
        generated_at: Utc::now(),
        signature: current_signature(state),
    };
    tracing::debug!("generated content for {}", record.signature);
    Ok(state.generated.insert(record))
}
