//! The workflow engine: the only path that mutates a work item's status.
//!
//! Components mirror the pipeline order: [`resolver`] maps references to
//! rows, [`registry`] holds the legal moves, [`conditions`] gates them,
//! [`effects`] runs idempotent follow-ups (including parent-completion
//! cascades), and [`audit`] appends the immutable trail. [`WorkflowEngine`]
//! strings them together inside one transaction per call.

mod audit;
pub mod conditions;
pub mod effects;
mod engine;
mod error;
pub mod registry;
pub mod resolver;

pub use conditions::{Condition, Verdict};
pub use effects::Effect;
pub use engine::{WorkflowEngine, MAX_CASCADE_DEPTH};
pub use error::WorkflowError;
