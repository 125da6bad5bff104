use chrono::{DateTime, Duration, Utc};
use redline_core::{
    compute_next_due, due_from_period, is_overdue, next_from_interval, ReviewInterval,
    ReviewPeriod, ReviewPolicy,
};

fn date(value: &str) -> DateTime<Utc> {
    value.parse().unwrap()
}

#[test]
fn monthly_interval_keeps_the_day_of_month_when_it_exists() {
    assert_eq!(
        next_from_interval(date("2024-01-15T00:00:00Z"), ReviewInterval::Monthly, None),
        Some(date("2024-02-15T00:00:00Z"))
    );
}

#[test]
fn end_of_january_clamps_to_end_of_february() {
    // The documented overflow policy: clamp to the last valid day.
    let due = next_from_interval(date("2024-01-31T00:00:00Z"), ReviewInterval::Monthly, None);
    assert_eq!(due, Some(date("2024-02-29T00:00:00Z")));

    // Stable under repeated computation.
    let again = next_from_interval(date("2024-01-31T00:00:00Z"), ReviewInterval::Monthly, None);
    assert_eq!(due, again);
}

#[test]
fn one_week_period_is_seven_days() {
    assert_eq!(
        due_from_period(date("2024-01-01T00:00:00Z"), ReviewPeriod::OneWeek),
        Some(date("2024-01-08T00:00:00Z"))
    );
}

#[test]
fn orchestrator_prefers_the_completed_review_anchor() {
    let policy = ReviewPolicy {
        opens_for_review: Some(date("2024-01-01T00:00:00Z")),
        review_period: Some(ReviewPeriod::OneMonth),
        last_reviewed_on: Some(date("2024-06-01T00:00:00Z")),
        review_interval: Some(ReviewInterval::Annually),
        ..ReviewPolicy::default()
    };
    assert_eq!(compute_next_due(&policy), Some(date("2025-06-01T00:00:00Z")));
}

#[test]
fn orchestrator_is_idempotent_for_identical_inputs() {
    let policy = ReviewPolicy {
        last_reviewed_on: Some(date("2024-01-31T10:15:00Z")),
        review_interval: Some(ReviewInterval::Custom),
        review_interval_days: Some(90),
        ..ReviewPolicy::default()
    };
    let first = compute_next_due(&policy);
    let second = compute_next_due(&policy);
    assert_eq!(first, Some(date("2024-04-30T10:15:00Z")));
    assert_eq!(first, second);
}

#[test]
fn overdue_matches_the_classifier_contract() {
    let now = date("2024-05-01T12:00:00Z");
    assert!(is_overdue(Some(now - Duration::seconds(1)), false, now));
    assert!(is_overdue(Some(now), false, now));
    assert!(!is_overdue(Some(now - Duration::days(99)), true, now));
    assert!(!is_overdue(None, false, now));
}
