pub mod graph;
pub mod progress;

pub use graph::{EdgeKey, KnowledgeGraph};
pub use progress::{BatchTracker, DocumentProgress};
