//! Relationship prompt.

use shared_types::Entity;

/// Render the relationship prompt for one chunk and its entities.
#[must_use]
pub fn relationship_prompt(content: &str, entities: &[Entity]) -> String {
    let listing: String = entities
        .iter()
        .map(|e| format!("- {} ({})\n", e.text, e.entity_type))
        .collect();

    format!(
        r#"You are analysing an intelligence document. The following entities were found in it:

{listing}
Identify the relationships between these entities that the text states or clearly implies.

Return ONLY a JSON array. Each element must be an object with:
  "source": the name of one listed entity
  "target": the name of another listed entity
  "relation_type": a short UPPER_SNAKE_CASE verb phrase, e.g. WORKS_FOR, LOCATED_IN, COMMANDS
  "confidence": a number between 0 and 1

Use only the listed entity names. Return [] if there are no relationships.

TEXT:
"""
{content}
"""
"#,
        content = content.trim()
    )
}
