//! Waypoint: a workflow state machine for tracked work items.
//!
//! Issues, features, and tasks move through per-type state machines held in
//! a transition registry. Every status change goes through the
//! [`workflow::WorkflowEngine`], which validates the move, checks its
//! condition, runs its side effects (including parent-completion cascades),
//! and appends an immutable audit record, all as one transactional unit.

pub mod api;
pub mod db;
pub mod models;
pub mod workflow;
