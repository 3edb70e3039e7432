pub mod normalize;
pub mod prompt;

pub use normalize::{normalize_entities, NormalizeError};
pub use prompt::extraction_prompt;
