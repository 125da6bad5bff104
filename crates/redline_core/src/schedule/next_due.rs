//! Next-due orchestration over the two calculators.
//!
//! # Responsibility
//! - Select which anchor applies for a policy and produce the authoritative
//!   due date.
//!
//! # Invariants
//! - A completed-review anchor always wins over the publication anchor.
//! - Pure function: identical inputs yield a bit-identical date, every time.

use crate::model::document::ReviewPolicy;
use crate::schedule::interval::{due_from_period, next_from_interval};
use chrono::{DateTime, Utc};

/// Computes the authoritative next review due date for a policy.
///
/// Priority, first match wins:
/// 1. `last_reviewed_on` + `review_interval` -> recurring interval.
/// 2. `opens_for_review` + `review_period` -> first-review window.
/// 3. Neither anchor usable -> `None` ("not yet computable", not a fault).
///
/// Persisting the result into `next_review_due_on` is the caller's job and
/// must happen on every write that touches an anchor field.
pub fn compute_next_due(policy: &ReviewPolicy) -> Option<DateTime<Utc>> {
    if let (Some(last_reviewed), Some(interval)) =
        (policy.last_reviewed_on, policy.review_interval)
    {
        return next_from_interval(last_reviewed, interval, policy.review_interval_days);
    }

    if let (Some(opens), Some(period)) = (policy.opens_for_review, policy.review_period) {
        return due_from_period(opens, period);
    }

    None
}
