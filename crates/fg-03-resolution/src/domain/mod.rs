pub mod content_cache;
pub mod prompt;
pub mod relations;

pub use content_cache::ContentCache;
pub use prompt::relationship_prompt;
pub use relations::{resolve_relationships, RelationError};
