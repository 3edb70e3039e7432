pub mod memory;

pub use memory::InMemoryKnowledgeStore;
