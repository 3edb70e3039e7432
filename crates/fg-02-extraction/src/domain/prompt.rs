//! Extraction prompt.

const TEMPLATE: &str = r#"You are an information extraction system. Identify the named entities in the text below.

Return ONLY a JSON array. Each element must be an object with:
  "type": one of PERSON, ORGANIZATION, LOCATION, EVENT, EQUIPMENT, DATE, OTHER
  "text": the entity name exactly as written
  "attributes": an object of additional facts stated in the text (may be empty)

Do not repeat an entity. Do not add commentary.

TEXT:
"""
{content}
"""
"#;

/// Render the extraction prompt for one chunk.
#[must_use]
pub fn extraction_prompt(content: &str) -> String {
    TEMPLATE.replace("{content}", content.trim())
}
