//! Structured cancellation for stage runs.
//!
//! This module provides:
//! - CancellationToken for cooperative cancellation
//! - TaskScope, the executor + token a stage run is started on
//! - StageTask / TaskOutcome, the handle and result of a spawned run

mod scope;
mod task;
mod token;

pub(crate) use scope::background_runtime;
pub use scope::TaskScope;
pub use task::{StageTask, TaskOutcome};
pub use token::{CancelCallback, CancelRegistration, CancellationToken};
