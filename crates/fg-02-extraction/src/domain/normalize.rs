//! Normalization of raw LLM entity output.
//!
//! Rules:
//!
//! - The top-level value must be an array
//! - Elements must be objects carrying both `type` and `text`
//! - `type` is upper-cased, `text` trimmed; an empty text drops the element
//! - A non-object `attributes` value becomes an empty map
//! - Duplicates (same derived id) keep the first occurrence

use serde_json::Value;
use shared_types::{Attributes, Entity};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("expected a JSON array of entities, got {0}")]
    NotAnArray(&'static str),
}

/// Convert raw model output into normalized entities.
pub fn normalize_entities(raw: Value) -> Result<Vec<Entity>, NormalizeError> {
    let items = match raw {
        Value::Array(items) => items,
        other => return Err(NormalizeError::NotAnArray(kind_of(&other))),
    };

    let mut seen = HashSet::new();
    let entities = items
        .into_iter()
        .filter_map(normalize_one)
        .filter(|e| seen.insert(e.id()))
        .collect();
    Ok(entities)
}

fn normalize_one(item: Value) -> Option<Entity> {
    let Value::Object(mut fields) = item else {
        return None;
    };

    let entity_type = scalar_text(fields.get("type")?)?;
    let text = scalar_text(fields.get("text")?)?;
    if text.trim().is_empty() || entity_type.trim().is_empty() {
        return None;
    }

    let mut entity = Entity::new(entity_type, text);
    if let Some(Value::Object(attrs)) = fields.remove("attributes") {
        entity.attributes = attrs.into_iter().collect::<Attributes>();
    }
    Some(entity)
}

/// Strings pass through; numbers and booleans are rendered.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
