//! Pipeline execution: orchestrator, retry policy, fallback repair.

pub mod fallback;
pub mod orchestrator;
pub mod retry;

pub use fallback::fallback_consistency_pass;
pub use orchestrator::{Orchestrator, RunOutcome, RunReport};
pub use retry::RetryPolicy;
