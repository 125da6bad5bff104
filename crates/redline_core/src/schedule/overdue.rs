//! Overdue classification.

use chrono::{DateTime, Utc};

/// Classifies a document snapshot as overdue.
///
/// A completed review is never overdue regardless of date, and a document
/// without a computed due date is not yet actionable. Otherwise a document
/// is overdue from the exact due instant onwards (`due <= now`).
pub fn is_overdue(
    due_date: Option<DateTime<Utc>>,
    review_completed: bool,
    now: DateTime<Utc>,
) -> bool {
    if review_completed {
        return false;
    }
    match due_date {
        Some(due) => due <= now,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::is_overdue;
    use chrono::{DateTime, Duration, Utc};

    fn now() -> DateTime<Utc> {
        "2024-05-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn past_due_and_incomplete_is_overdue() {
        assert!(is_overdue(Some(now() - Duration::seconds(1)), false, now()));
    }

    #[test]
    fn due_at_this_exact_instant_counts() {
        assert!(is_overdue(Some(now()), false, now()));
    }

    #[test]
    fn future_due_is_not_overdue() {
        assert!(!is_overdue(Some(now() + Duration::seconds(1)), false, now()));
    }

    #[test]
    fn completed_review_is_never_overdue() {
        assert!(!is_overdue(Some(now() - Duration::days(30)), true, now()));
    }

    #[test]
    fn missing_due_date_is_not_actionable() {
        assert!(!is_overdue(None, false, now()));
    }
}
