pub mod prompt;

pub use prompt::{narrative_prompt, MAX_PROMPT_EDGES};
