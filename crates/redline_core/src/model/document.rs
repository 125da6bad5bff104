//! Document domain model and review policy.
//!
//! # Responsibility
//! - Define the Document aggregate shared by scheduling, tracking and dispatch.
//! - Define review policy fields and their validation rules.
//! - Derive the deduplicated notification recipient set.
//!
//! # Invariants
//! - `uuid` is stable and never reused for another document.
//! - `next_review_due_on` is derived state; it is recomputed by the service
//!   layer, never accepted from callers.
//! - `review_interval_days` must be positive when present.

use crate::model::assignment::ReviewAssignment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a document aggregate.
pub type DocumentId = Uuid;

/// Stable identifier for a user referenced by a document.
pub type UserId = Uuid;

/// Recurrence cadence applied after a review cycle completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewInterval {
    /// One calendar month between reviews.
    Monthly,
    /// Three calendar months between reviews.
    Quarterly,
    /// Six calendar months between reviews.
    Semiannually,
    /// Twelve calendar months between reviews.
    Annually,
    /// Caller-defined day count, carried in `review_interval_days`.
    Custom,
}

/// Window length from `opens_for_review` to the first due date.
///
/// Used only before any review cycle has completed; afterwards the
/// recurring interval takes over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewPeriod {
    OneWeek,
    TwoWeeks,
    ThreeWeeks,
    OneMonth,
}

/// Review scheduling state embedded in a document.
///
/// All anchor fields are optional: a document that has not yet been placed
/// under review simply has nothing to compute from, and the calculators
/// treat that as a normal case rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPolicy {
    /// When the document first becomes subject to review. Set once.
    pub opens_for_review: Option<DateTime<Utc>>,
    /// Recurring cadence applied after a completed cycle.
    pub review_interval: Option<ReviewInterval>,
    /// Day count for `ReviewInterval::Custom`; ignored for other cadences.
    pub review_interval_days: Option<i64>,
    /// Window length before the first review becomes due.
    pub review_period: Option<ReviewPeriod>,
    /// Anchor for recurring calculation once a cycle has completed.
    pub last_reviewed_on: Option<DateTime<Utc>>,
    /// Derived due date. Always recomputable from the other fields; a stale
    /// value after an anchor change is a defect, not a cached fact.
    pub next_review_due_on: Option<DateTime<Utc>>,
    /// True only while the current cycle's assignment set is fully completed.
    pub review_completed: bool,
}

/// Validation error for persisted policy state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyValidationError {
    /// `review_interval_days` must be a positive day count when present.
    NonPositiveIntervalDays(i64),
}

impl Display for PolicyValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveIntervalDays(days) => {
                write!(f, "review_interval_days must be positive, got {days}")
            }
        }
    }
}

impl Error for PolicyValidationError {}

impl ReviewPolicy {
    /// Validates field-level invariants before a write.
    ///
    /// Missing anchors are allowed; only present-but-nonsensical values are
    /// rejected here.
    pub fn validate(&self) -> Result<(), PolicyValidationError> {
        if let Some(days) = self.review_interval_days {
            if days <= 0 {
                return Err(PolicyValidationError::NonPositiveIntervalDays(days));
            }
        }
        Ok(())
    }
}

/// Notification-eligible person reference.
///
/// Resolvable shape required from the external user directory: identity,
/// a display name for report output and a contact address for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: UserId,
    pub display_name: String,
    pub contact_address: String,
}

/// Document aggregate as seen by the review-scheduling core.
///
/// Persistence is owned by the document store; this model only computes and
/// proposes new field values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable global ID used for linking and auditing.
    pub uuid: DocumentId,
    pub title: String,
    pub policy: ReviewPolicy,
    /// Current cycle's assignee completion state.
    pub assignment: ReviewAssignment,
    pub stakeholders: Vec<UserRef>,
    pub owners: Vec<UserRef>,
    /// Optimistic-concurrency token, incremented by the store on every
    /// mutation. A mismatch on write means another writer got there first.
    pub revision: i64,
}

impl Document {
    /// Creates a document with a generated stable ID and empty review state.
    pub fn new(title: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), title)
    }

    /// Creates a document with a caller-provided stable ID.
    ///
    /// Used by import paths where identity already exists externally.
    pub fn with_id(uuid: DocumentId, title: impl Into<String>) -> Self {
        Self {
            uuid,
            title: title.into(),
            policy: ReviewPolicy::default(),
            assignment: ReviewAssignment::default(),
            stakeholders: Vec::new(),
            owners: Vec::new(),
            revision: 0,
        }
    }

    /// Validates aggregate invariants before a write.
    pub fn validate(&self) -> Result<(), PolicyValidationError> {
        self.policy.validate()
    }

    /// Union of stakeholders and owners, deduplicated by user identity.
    ///
    /// A user present in both roles appears exactly once, at their first
    /// position (stakeholders first, then owners).
    pub fn notification_recipients(&self) -> Vec<&UserRef> {
        let mut seen: HashSet<UserId> = HashSet::new();
        self.stakeholders
            .iter()
            .chain(self.owners.iter())
            .filter(|user| seen.insert(user.id))
            .collect()
    }
}
