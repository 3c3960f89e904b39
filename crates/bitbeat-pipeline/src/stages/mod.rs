//! The four action stages.
//!
//! Each stage wraps one action and implements [`Stage`](crate::Stage). The
//! free functions next to them hold the actual logic so it can be used and
//! tested without a request context.

mod execution;
mod format;
mod output;
mod validation;

pub use execution::{accepts, ExecutionStage};
pub use format::{format_inputs, FormatStage};
pub use output::{shape_output, OutputStage};
pub use validation::{validate_inputs, ValidationStage};
