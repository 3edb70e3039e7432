//! # Entity Profiles
//!
//! Prompt construction and validation of the model's profile JSON:
//!
//! ```json
//! {"summary": "...", "key_attributes": ["..."], "importance": 0.8}
//! ```

use serde::Deserialize;
use shared_types::GraphEdge;
use thiserror::Error;

/// Profile as returned by the model, before validation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProfileDraft {
    pub summary: String,
    pub key_attributes: Vec<String>,
    pub importance: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("profile has no summary")]
    EmptySummary,
}

/// A validated profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub summary: String,
    pub key_attributes: Vec<String>,
    /// In `[0, 1]`.
    pub importance: f32,
}

impl ProfileDraft {
    /// Trim text, drop blank attributes and clamp importance.
    ///
    /// Importance given on a 1-10 scale is rescaled.
    pub fn validate(self) -> Result<Profile, ProfileError> {
        let summary = self.summary.trim().to_string();
        if summary.is_empty() {
            return Err(ProfileError::EmptySummary);
        }
        let key_attributes = self
            .key_attributes
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        let importance = if !self.importance.is_finite() {
            0.0
        } else if self.importance > 1.0 {
            (self.importance / 10.0).min(1.0)
        } else {
            self.importance.max(0.0)
        };
        Ok(Profile {
            summary,
            key_attributes,
            importance,
        })
    }
}

/// Lines describing the edges that touch `node`.
#[must_use]
pub fn relation_lines(node: &str, edges: &[GraphEdge]) -> Vec<String> {
    edges
        .iter()
        .filter(|e| e.source == node || e.target == node)
        .map(|e| format!("{} -[{}]-> {}", e.source, e.relation_type, e.target))
        .collect()
}

#[must_use]
pub fn profile_prompt(name: &str, entity_type: &str, relations: &[String]) -> String {
    let relations = if relations.is_empty() {
        "(none known)".to_string()
    } else {
        relations.join("\n")
    };
    format!(
        "Write an intelligence profile of the {entity_type} \"{name}\".\n\n\
         Known relationships:\n{relations}\n\n\
         Return only JSON of the form \
         {{\"summary\": \"two or three sentences\", \
         \"key_attributes\": [\"short fact\", ...], \
         \"importance\": number between 0 and 1}}."
    )
}
