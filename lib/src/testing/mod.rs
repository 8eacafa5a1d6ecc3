//! Host-side test support.
//!
//! Built for this crate's own unit tests and, behind the `sim` feature, for
//! dependent crates' test suites. Nothing here is meant for a kernel image.

pub mod sim;

pub use sim::{PageArena, SimCpu, capture_logs, captured_lines};
