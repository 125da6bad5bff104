//! Calendar arithmetic for review intervals and first-review periods.
//!
//! # Responsibility
//! - Advance a date by a recurring cadence (`next_from_interval`).
//! - Derive the first due date from the review-window length
//!   (`due_from_period`).
//!
//! # Invariants
//! - Month addition clamps to the last valid day of the target month
//!   (2024-01-31 + 1 month = 2024-02-29). The same policy applies to every
//!   call site that adds calendar months.
//! - Invalid input is a normal case and yields `None`; these functions
//!   never panic.

use crate::model::document::{ReviewInterval, ReviewPeriod};
use chrono::{DateTime, Duration, Months, Utc};

/// Advances `base` by one recurrence of `interval`.
///
/// `custom_days` is consulted only for [`ReviewInterval::Custom`] and must be
/// positive; otherwise the result is `None`. Arithmetic overflow at the edges
/// of the representable date range also yields `None`.
pub fn next_from_interval(
    base: DateTime<Utc>,
    interval: ReviewInterval,
    custom_days: Option<i64>,
) -> Option<DateTime<Utc>> {
    match interval {
        ReviewInterval::Monthly => add_months(base, 1),
        ReviewInterval::Quarterly => add_months(base, 3),
        ReviewInterval::Semiannually => add_months(base, 6),
        ReviewInterval::Annually => add_months(base, 12),
        ReviewInterval::Custom => {
            let days = custom_days.filter(|days| *days > 0)?;
            base.checked_add_signed(Duration::try_days(days)?)
        }
    }
}

/// Derives the first due date from the review window length.
pub fn due_from_period(opens: DateTime<Utc>, period: ReviewPeriod) -> Option<DateTime<Utc>> {
    match period {
        ReviewPeriod::OneWeek => opens.checked_add_signed(Duration::days(7)),
        ReviewPeriod::TwoWeeks => opens.checked_add_signed(Duration::days(14)),
        ReviewPeriod::ThreeWeeks => opens.checked_add_signed(Duration::days(21)),
        ReviewPeriod::OneMonth => add_months(opens, 1),
    }
}

fn add_months(base: DateTime<Utc>, months: u32) -> Option<DateTime<Utc>> {
    base.checked_add_months(Months::new(months))
}
