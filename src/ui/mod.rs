//! Terminal output for command results
//!
//! Lifecycle progress goes through `tracing`; these helpers print the
//! one-line result of a command, with symbols on a terminal and bracketed
//! markers in CI logs.

mod context;
mod output;

pub use context::UiContext;
pub use output::{key_value, step_ok, step_ok_detail, step_warn, step_warn_hint};
