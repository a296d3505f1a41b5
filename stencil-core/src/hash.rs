//! Deterministic content hashing for JSON-like trees.
//!
//! The tree is written in a canonical form (object keys sorted at every
//! depth, arrays in order, no whitespace) and the bytes are SHA-256 hashed.
//! Canonicalization never relies on `serde_json::Map` iteration order, which
//! changes when `preserve_order` is enabled anywhere in the build.
//! Integral floats within the exact-integer range of an `f64` are written as
//! integers, so `1`, `1.0` and `-0.0`/`0` hash alike.
//!
//! This is a change detector, not an integrity check.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::{CustomEntityContent, EntityId, TemplateInfo};

/// 2^53: above this an `f64` no longer maps one-to-one onto integers.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Hex SHA-256 of the canonical form of `value`.
pub fn content_hash(value: &Value) -> String {
    let canonical = canonical_json(value);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Canonical JSON text for `value`.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Display on a string Value yields the escaped JSON literal.
                out.push_str(&Value::from(key.as_str()).to_string());
                out.push(':');
                if let Some(child) = map.get(key) {
                    write_canonical(child, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Number(n) => match n.as_f64() {
            Some(f)
                if n.is_f64() && f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGER =>
            {
                out.push_str(&(f as i64).to_string())
            }
            _ => out.push_str(&n.to_string()),
        },
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Hash of the library subset: catalog plus custom content.
///
/// Timestamps and actors are not part of the input: identical content from
/// different sessions hashes the same.
pub fn library_hash(
    entities: &[TemplateInfo],
    custom_content: &BTreeMap<EntityId, CustomEntityContent>,
) -> Result<String, serde_json::Error> {
    let value = serde_json::json!({
        "entities": serde_json::to_value(entities)?,
        "customContent": serde_json::to_value(custom_content)?,
    });
    Ok(content_hash(&value))
}
