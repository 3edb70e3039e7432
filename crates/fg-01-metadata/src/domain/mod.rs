//! Pure metadata extraction, no I/O.

pub mod header;

pub use header::{extract_metadata, HEADER_CHARS};
