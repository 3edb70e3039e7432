//! # Forge Test Suite
//!
//! Unified test crate for behaviour that spans more than one crate.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs        # Routed LLM provider and sample report
//!     ├── bus_properties.rs  # Delivery guarantees of the event bus
//!     └── pipeline.rs        # Full choreography through every stage
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p forge-tests
//! cargo test -p forge-tests integration::pipeline::
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]

pub mod integration;
