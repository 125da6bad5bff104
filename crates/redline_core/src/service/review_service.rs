//! Review lifecycle service.
//!
//! # Responsibility
//! - Orchestrate policy writes, assignment tracking and cycle transitions.
//! - Enforce that `next_review_due_on` is always recomputed, never accepted
//!   from callers: [`PolicyPatch`] has no field for it.
//!
//! # Invariants
//! - Every write that touches an anchor field recomputes the due date in the
//!   same operation.
//! - Every mutation goes through the store's revision check; concurrent
//!   writers get a `Conflict`, not a lost update.
//! - Completing the last pending assignee anchors `last_reviewed_on` and
//!   flips `review_completed` in one transaction.
//! - `review_completed` stays in step with the assignee set across set
//!   mutations; growing a completed cycle reopens it.

use crate::model::assignment::{AssigneeId, AssignmentError, ReviewAssignment};
use crate::model::document::{
    Document, DocumentId, PolicyValidationError, ReviewInterval, ReviewPeriod, ReviewPolicy,
    UserRef,
};
use crate::repo::document_repo::{DocumentStore, RepoError};
use crate::schedule::{compute_next_due, is_overdue};
use chrono::{DateTime, Utc};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for review lifecycle use-cases.
#[derive(Debug)]
pub enum ServiceError {
    /// Target document does not exist.
    DocumentNotFound(DocumentId),
    /// Another writer mutated the document first; reload and retry.
    Conflict { document: DocumentId, expected: i64 },
    /// Assignment set invariant violation.
    Assignment(AssignmentError),
    /// Policy field invariant violation.
    Validation(PolicyValidationError),
    /// Persistence-layer failure.
    Repo(RepoError),
    /// Internal consistency mismatch between write and read-back.
    InconsistentState(&'static str),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DocumentNotFound(id) => write!(f, "document not found: {id}"),
            Self::Conflict { document, expected } => write!(
                f,
                "document {document} moved past revision {expected}; reload and retry"
            ),
            Self::Assignment(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => write!(f, "inconsistent review state: {details}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Assignment(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::DocumentNotFound(id),
            RepoError::RevisionConflict { document, expected } => {
                Self::Conflict { document, expected }
            }
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

impl From<AssignmentError> for ServiceError {
    fn from(value: AssignmentError) -> Self {
        Self::Assignment(value)
    }
}

/// Caller-writable policy fields.
///
/// `next_review_due_on` and `review_completed` are deliberately absent:
/// derived state cannot be set through any write surface, only recomputed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyPatch {
    pub opens_for_review: Option<DateTime<Utc>>,
    pub review_interval: Option<ReviewInterval>,
    pub review_interval_days: Option<i64>,
    pub review_period: Option<ReviewPeriod>,
    pub last_reviewed_on: Option<DateTime<Utc>>,
}

impl PolicyPatch {
    /// Replaces the caller-writable fields of `policy`, leaving derived
    /// state untouched. Full replacement semantics, like every update path
    /// in this crate.
    fn apply_to(&self, policy: &mut ReviewPolicy) {
        policy.opens_for_review = self.opens_for_review;
        policy.review_interval = self.review_interval;
        policy.review_interval_days = self.review_interval_days;
        policy.review_period = self.review_period;
        policy.last_reviewed_on = self.last_reviewed_on;
    }
}

/// Review lifecycle facade over a document store implementation.
pub struct ReviewService<S: DocumentStore> {
    store: S,
}

impl<S: DocumentStore> ReviewService<S> {
    /// Creates a service using the provided store implementation.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Creates a document with its initial policy and assignee set.
    ///
    /// The initial due date is computed here, before the first persist, so
    /// the stored aggregate never carries a stale derived field.
    pub fn create_document(
        &self,
        title: impl Into<String>,
        patch: PolicyPatch,
        assignee_ids: Vec<AssigneeId>,
        stakeholders: Vec<UserRef>,
        owners: Vec<UserRef>,
    ) -> Result<Document, ServiceError> {
        let mut document = Document::new(title);
        patch.apply_to(&mut document.policy);
        document.policy.next_review_due_on = compute_next_due(&document.policy);
        document.assignment = ReviewAssignment::for_assignees(assignee_ids);
        document.stakeholders = stakeholders;
        document.owners = owners;

        let id = self.store.create_document(&document)?;
        info!(
            "event=document_created module=service status=ok document={id} assignees={}",
            document.assignment.assignees().len()
        );
        self.reload(id)
    }

    /// Gets one document by stable ID.
    pub fn get_document(&self, id: DocumentId) -> Result<Option<Document>, ServiceError> {
        Ok(self.store.get_document(id)?)
    }

    /// Replaces the caller-writable policy fields and recomputes the due date.
    ///
    /// Any `next_review_due_on` a caller might try to smuggle in has no
    /// channel here; the stored value is always the formula's output.
    pub fn update_policy(
        &self,
        id: DocumentId,
        patch: PolicyPatch,
    ) -> Result<Document, ServiceError> {
        let document = self.load(id)?;
        let mut policy = document.policy.clone();
        patch.apply_to(&mut policy);
        policy.next_review_due_on = compute_next_due(&policy);
        policy.validate().map_err(ServiceError::Validation)?;

        self.store.update_policy(id, &policy, document.revision)?;
        self.reload(id)
    }

    /// Starts a new review cycle with a fresh assignee set.
    ///
    /// The previous cycle's completions do not carry forward, and the
    /// completion flag resets alongside the assignment set.
    pub fn schedule_review(
        &self,
        id: DocumentId,
        assignee_ids: Vec<AssigneeId>,
    ) -> Result<Document, ServiceError> {
        let document = self.load(id)?;
        let mut policy = document.policy.clone();
        policy.review_completed = false;
        policy.next_review_due_on = compute_next_due(&policy);

        let mut assignment = document.assignment.clone();
        assignment.reset_for_new_cycle(assignee_ids);

        self.store
            .update_review_state(id, &policy, &assignment, document.revision)?;
        info!(
            "event=review_scheduled module=service status=ok document={id} assignees={}",
            assignment.assignees().len()
        );
        self.reload(id)
    }

    /// Adds one pending assignee to the current cycle.
    ///
    /// Adding to a completed cycle reopens it: the completion flag tracks
    /// the set, and the document becomes dispatch-eligible again.
    pub fn add_assignee(
        &self,
        id: DocumentId,
        assignee_id: AssigneeId,
    ) -> Result<Document, ServiceError> {
        let document = self.load(id)?;
        let mut assignment = document.assignment.clone();
        assignment.add_assignee(assignee_id)?;
        self.store_assignment(&document, &assignment)
    }

    /// Removes one assignee from the current cycle.
    ///
    /// Removing the last pending assignee closes the cycle. The anchors stay
    /// untouched; nobody reviewed anything at that instant.
    pub fn remove_assignee(
        &self,
        id: DocumentId,
        assignee_id: AssigneeId,
    ) -> Result<Document, ServiceError> {
        let document = self.load(id)?;
        let mut assignment = document.assignment.clone();
        assignment.remove_assignee(assignee_id)?;
        self.store_assignment(&document, &assignment)
    }

    /// Persists a mutated assignee set, keeping `review_completed` in step
    /// with it.
    fn store_assignment(
        &self,
        document: &Document,
        assignment: &ReviewAssignment,
    ) -> Result<Document, ServiceError> {
        let all_completed = assignment.summary().all_completed;
        if all_completed == document.policy.review_completed {
            self.store
                .update_assignment(document.uuid, assignment, document.revision)?;
        } else {
            let mut policy = document.policy.clone();
            policy.review_completed = all_completed;
            self.store
                .update_review_state(document.uuid, &policy, assignment, document.revision)?;
        }
        self.reload(document.uuid)
    }

    /// Records one assignee's "mark reviewed" action.
    ///
    /// When this completes the cycle, `last_reviewed_on` is anchored at
    /// `now`, the completion flag flips, and the next due date is recomputed
    /// from the recurring interval, all in one revision-guarded write.
    pub fn mark_reviewed(
        &self,
        id: DocumentId,
        assignee_id: AssigneeId,
        now: DateTime<Utc>,
    ) -> Result<Document, ServiceError> {
        let document = self.load(id)?;
        let mut assignment = document.assignment.clone();
        assignment.mark_completed(assignee_id, now)?;

        // Repeating the mark changes nothing; returning the stored document
        // as-is keeps the anchors and the schedule untouched.
        if assignment == document.assignment {
            return Ok(document);
        }
        let summary = assignment.summary();

        if summary.all_completed {
            let mut policy = document.policy.clone();
            policy.last_reviewed_on = Some(now);
            policy.review_completed = true;
            policy.next_review_due_on = compute_next_due(&policy);
            self.store
                .update_review_state(id, &policy, &assignment, document.revision)?;
            info!(
                "event=review_cycle_completed module=service status=ok document={id} total={}",
                summary.total_count
            );
        } else {
            self.store
                .update_assignment(id, &assignment, document.revision)?;
            info!(
                "event=review_marked module=service status=ok document={id} completed={} total={}",
                summary.completed_count, summary.total_count
            );
        }

        self.reload(id)
    }

    /// Documents whose due date has arrived and whose cycle is incomplete.
    pub fn overdue_documents(&self, now: DateTime<Utc>) -> Result<Vec<Document>, ServiceError> {
        let documents = self.store.list_documents()?;
        Ok(documents
            .into_iter()
            .filter(|document| {
                is_overdue(
                    document.policy.next_review_due_on,
                    document.policy.review_completed,
                    now,
                )
            })
            .collect())
    }

    fn load(&self, id: DocumentId) -> Result<Document, ServiceError> {
        self.store
            .get_document(id)?
            .ok_or(ServiceError::DocumentNotFound(id))
    }

    fn reload(&self, id: DocumentId) -> Result<Document, ServiceError> {
        self.store
            .get_document(id)?
            .ok_or(ServiceError::InconsistentState(
                "written document not found in read-back",
            ))
    }
}
