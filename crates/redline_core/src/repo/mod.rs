//! Persistence contracts for the review-scheduling core.
//!
//! The document store is an external collaborator from the core's point of
//! view; `document_repo` defines the consumed interface and ships the
//! SQLite implementation used by the batch entry point and tests.

pub mod document_repo;
