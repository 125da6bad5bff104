//! Per-cycle assignee completion state machine.
//!
//! # Responsibility
//! - Track which assignees have completed the current review cycle.
//! - Derive aggregate completion statistics for UI and scheduling consumers.
//!
//! # Invariants
//! - Assignees are unique by `assignee_id`.
//! - The only transition is `Pending -> Completed`; `Completed` is terminal
//!   for the current cycle.
//! - A new cycle replaces the whole set; prior completions never carry over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a review assignee.
pub type AssigneeId = Uuid;

/// Completion state of one assignee within the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssigneeStatus {
    Pending,
    Completed,
}

/// One assignee's record for the current review cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignee {
    pub assignee_id: AssigneeId,
    pub status: AssigneeStatus,
    /// Set exactly once, when the assignee marks the cycle reviewed.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Error for assignment set mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentError {
    /// The assignee is already part of the current cycle.
    Duplicate(AssigneeId),
    /// The assignee is not part of the current cycle.
    NotFound(AssigneeId),
}

impl Display for AssignmentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duplicate(id) => write!(f, "assignee already present: {id}"),
            Self::NotFound(id) => write!(f, "assignee not found: {id}"),
        }
    }
}

impl Error for AssignmentError {}

/// Aggregate completion statistics for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentSummary {
    pub completed_count: u32,
    pub total_count: u32,
    /// Completed share in percent, rounded half-up; 0 for an empty set.
    pub percentage: u32,
    /// True only when the set is non-empty and every assignee completed.
    pub all_completed: bool,
}

/// Assignee set for one document's current review cycle.
///
/// Insertion order is preserved so listings stay stable across reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewAssignment {
    assignees: Vec<Assignee>,
}

impl ReviewAssignment {
    /// Creates an empty assignment set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh set of pending entries for the given assignees.
    ///
    /// Duplicate ids in the input collapse to one entry.
    pub fn for_assignees(ids: impl IntoIterator<Item = AssigneeId>) -> Self {
        let mut assignment = Self::new();
        for id in ids {
            // Duplicates are a caller convenience here, not an error: the
            // set is being built from scratch, not mutated.
            let _ = assignment.add_assignee(id);
        }
        assignment
    }

    /// Current cycle's assignees in insertion order.
    pub fn assignees(&self) -> &[Assignee] {
        &self.assignees
    }

    /// Adds one pending assignee to the current cycle.
    pub fn add_assignee(&mut self, id: AssigneeId) -> Result<(), AssignmentError> {
        if self.position_of(id).is_some() {
            return Err(AssignmentError::Duplicate(id));
        }
        self.assignees.push(Assignee {
            assignee_id: id,
            status: AssigneeStatus::Pending,
            completed_at: None,
        });
        Ok(())
    }

    /// Removes one assignee from the current cycle.
    pub fn remove_assignee(&mut self, id: AssigneeId) -> Result<(), AssignmentError> {
        match self.position_of(id) {
            Some(index) => {
                self.assignees.remove(index);
                Ok(())
            }
            None => Err(AssignmentError::NotFound(id)),
        }
    }

    /// Applies the `Pending -> Completed` transition for one assignee.
    ///
    /// Marking an already-completed assignee again is a no-op, not an error;
    /// the original `completed_at` is kept.
    pub fn mark_completed(
        &mut self,
        id: AssigneeId,
        now: DateTime<Utc>,
    ) -> Result<(), AssignmentError> {
        let index = self.position_of(id).ok_or(AssignmentError::NotFound(id))?;
        let assignee = &mut self.assignees[index];
        if assignee.status == AssigneeStatus::Completed {
            return Ok(());
        }
        assignee.status = AssigneeStatus::Completed;
        assignee.completed_at = Some(now);
        Ok(())
    }

    /// Derives aggregate completion statistics.
    pub fn summary(&self) -> AssignmentSummary {
        let total_count = self.assignees.len() as u32;
        let completed_count = self
            .assignees
            .iter()
            .filter(|assignee| assignee.status == AssigneeStatus::Completed)
            .count() as u32;

        AssignmentSummary {
            completed_count,
            total_count,
            percentage: round_half_up_percent(completed_count, total_count),
            all_completed: total_count > 0 && completed_count == total_count,
        }
    }

    /// Replaces the entire set with fresh pending entries for a new cycle.
    ///
    /// Prior statuses and `completed_at` values are discarded.
    pub fn reset_for_new_cycle(&mut self, ids: impl IntoIterator<Item = AssigneeId>) {
        *self = Self::for_assignees(ids);
    }

    fn position_of(&self, id: AssigneeId) -> Option<usize> {
        self.assignees
            .iter()
            .position(|assignee| assignee.assignee_id == id)
    }

    /// Restores a set from persisted records, rejecting duplicate ids.
    pub(crate) fn from_records(records: Vec<Assignee>) -> Option<Self> {
        let mut seen: HashSet<AssigneeId> = HashSet::new();
        for record in &records {
            if !seen.insert(record.assignee_id) {
                return None;
            }
        }
        Some(Self { assignees: records })
    }
}

/// Integer percent with half-up rounding; 0 when `total` is 0.
///
/// Widened to u64 so the scaled numerator cannot overflow for any input.
fn round_half_up_percent(completed: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let completed = u64::from(completed);
    let total = u64::from(total);
    ((completed * 200 + total) / (2 * total)) as u32
}
