pub mod ledger;
pub mod prompt;

pub use ledger::{ordered_pair, MergeLedger};
pub use prompt::{confirmation_prompt, is_confirmed};
