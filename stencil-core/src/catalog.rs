//! Built-in system templates.

use crate::types::{ContentPayload, EntityId, TemplateInfo};

const BUILTIN: &[(&str, &str, &str)] = &[
    ("welcome", "Welcome", "onboarding"),
    ("password-reset", "Password reset", "account"),
    ("order-confirmation", "Order confirmation", "transactional"),
    ("shipping-update", "Shipping update", "transactional"),
    ("newsletter", "Newsletter", "marketing"),
];

/// The catalog a fresh install starts with.
pub fn builtin_catalog() -> Vec<TemplateInfo> {
    BUILTIN
        .iter()
        .map(|(id, name, category)| TemplateInfo {
            id: EntityId::from(*id),
            name: (*name).to_owned(),
            category: (*category).to_owned(),
            description: None,
        })
        .collect()
}

/// Placeholder copy for an entity that has no authored content.
pub fn stock_payload(info: &TemplateInfo) -> ContentPayload {
    ContentPayload {
        subject: info.name.clone(),
        preheader: String::new(),
        body: info.description.clone().unwrap_or_default(),
        cta: None,
    }
}
