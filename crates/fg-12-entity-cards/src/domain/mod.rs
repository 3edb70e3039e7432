pub mod card;

pub use card::entity_card;
