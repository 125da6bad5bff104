//! Domain models for documents under review.
//!
//! Modules:
//! - `document`: Document aggregate, review policy fields and people references.
//! - `assignment`: per-cycle assignee completion state machine.

pub mod assignment;
pub mod document;
