//! Cross-crate integration tests.

pub mod bus_properties;
pub mod fixtures;
pub mod pipeline;
