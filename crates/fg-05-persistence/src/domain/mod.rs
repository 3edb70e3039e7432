pub mod errors;
pub mod records;

pub use errors::StoreError;
pub use records::{
    DocumentRecord, EntityRecord, ProfileRecord, RelationshipRecord, StoreCounts,
};
