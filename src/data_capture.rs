pub mod stream_tee;
pub mod types;

pub use types::{Direction, TeeOutcome};
