//! Scheduler layer for the runner
//!
//! This layer drives test cases through the pipeline and decides which
//! cases run, in what order and how many at once.

pub mod orchestrator;
pub mod test_case;

pub use orchestrator::{Orchestrator, RunPolicy};
pub use test_case::TestCase;
