pub mod hashing;

pub use hashing::{HashingEmbedder, DEFAULT_DIMENSION};
