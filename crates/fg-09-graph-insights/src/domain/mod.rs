pub mod analysis;

pub use analysis::{AnalysisGraph, RELATED_TO};
