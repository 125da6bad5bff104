//! Core review-scheduling domain for Redline.
//! This crate is the single source of truth for review-cycle invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod notify;
pub mod repo;
pub mod schedule;
pub mod service;

pub use config::DispatchConfig;
pub use logging::{default_log_level, init_logging};
pub use model::assignment::{
    Assignee, AssigneeId, AssigneeStatus, AssignmentError, AssignmentSummary, ReviewAssignment,
};
pub use model::document::{
    Document, DocumentId, PolicyValidationError, ReviewInterval, ReviewPeriod, ReviewPolicy,
    UserId, UserRef,
};
pub use notify::dispatcher::{
    DispatchError, DispatchFailure, DispatchReport, NotificationDispatcher,
};
pub use notify::sender::{LogSender, NotificationSender, SendError};
pub use repo::document_repo::{
    DocumentStore, DueWindow, RepoError, RepoResult, SqliteDocumentStore,
};
pub use schedule::{compute_next_due, due_from_period, is_overdue, next_from_interval};
pub use service::review_service::{PolicyPatch, ReviewService, ServiceError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
