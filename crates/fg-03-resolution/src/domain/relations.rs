//! Validation of raw LLM relationship output.

use serde_json::Value;
use shared_types::{Entity, Relationship};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelationError {
    #[error("expected a JSON array of relationships")]
    NotAnArray,
}

/// Keep the relationships whose endpoints are known entities.
///
/// Endpoint names are matched case-insensitively and rewritten to the
/// entity's own spelling; endpoint types are filled from the entities.
/// Self-relations and duplicates are dropped.
pub fn resolve_relationships(raw: Value, entities: &[Entity]) -> Result<Vec<Relationship>, RelationError> {
    let Value::Array(items) = raw else {
        return Err(RelationError::NotAnArray);
    };

    let by_name: HashMap<String, &Entity> = entities
        .iter()
        .map(|e| (e.text.to_lowercase(), e))
        .collect();

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let Some(rel) = parse_one(&item, &by_name) else {
            continue;
        };
        if seen.insert(rel.id()) {
            out.push(rel);
        }
    }
    Ok(out)
}

fn parse_one(item: &Value, by_name: &HashMap<String, &Entity>) -> Option<Relationship> {
    let fields = item.as_object()?;
    let source = by_name.get(&fields.get("source")?.as_str()?.trim().to_lowercase())?;
    let target = by_name.get(&fields.get("target")?.as_str()?.trim().to_lowercase())?;
    if source.id() == target.id() {
        return None;
    }

    let relation_type = fields
        .get("relation_type")
        .or_else(|| fields.get("type"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())?
        .replace(' ', "_");

    let confidence = match fields.get("confidence") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(1.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(1.0),
        _ => 1.0,
    };

    Some(
        Relationship::new(source.text.clone(), target.text.clone(), relation_type)
            .with_confidence(confidence)
            .with_types(source.entity_type.clone(), target.entity_type.clone()),
    )
}
