//! Scheduled batch dispatch of review-window notifications.
//!
//! # Responsibility
//! - Find documents entering their review window and notify every
//!   stakeholder and owner exactly once per run.
//! - Absorb per-recipient failures; only a store failure aborts a run.
//!
//! # Invariants
//! - Recipient deduplication happens before fan-out, never after.
//! - Overlapping runs on one dispatcher instance are rejected, and the run
//!   lock is released on every exit path (RAII guard).
//! - Sends are sequential unless `send_workers > 1`, in which case a bounded
//!   pool of scoped threads delivers disjoint slices of the pair list.
//! - Every send is bounded by the configured per-send deadline; an overrun
//!   is recorded as a recoverable timeout for that recipient.

use crate::config::DispatchConfig;
use crate::model::document::{Document, DocumentId, UserId, UserRef};
use crate::notify::sender::{NotificationSender, SendError};
use crate::repo::document_repo::{DocumentStore, DueWindow, RepoError};
use chrono::{DateTime, NaiveTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// One failed `(document, recipient)` send within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchFailure {
    pub document_id: DocumentId,
    pub recipient_id: UserId,
    pub error: String,
}

/// Machine-readable outcome of one dispatch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Documents matched by the due-window query.
    pub processed: usize,
    /// Notifications delivered successfully.
    pub sent: usize,
    /// Per-pair failures; these never abort the run.
    pub failures: Vec<DispatchFailure>,
}

/// Fatal error for a whole dispatch run.
#[derive(Debug)]
pub enum DispatchError {
    /// Another run is still in flight on this dispatcher instance.
    AlreadyRunning,
    /// The document store was unreachable or rejected the candidate query.
    Store(RepoError),
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyRunning => write!(f, "a dispatch run is already in progress"),
            Self::Store(err) => write!(f, "document store failure: {err}"),
        }
    }
}

impl Error for DispatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::AlreadyRunning => None,
            Self::Store(err) => Some(err),
        }
    }
}

impl From<RepoError> for DispatchError {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

/// Batch dispatcher over a document store and a delivery backend.
///
/// The scheduler owns one instance; the instance-level run lock is what
/// guards against overlapping schedule triggers double-sending.
pub struct NotificationDispatcher<S, N> {
    store: S,
    sender: N,
    config: DispatchConfig,
    running: AtomicBool,
}

impl<S, N> NotificationDispatcher<S, N>
where
    S: DocumentStore,
    N: NotificationSender + Sync,
{
    /// Creates a dispatcher with the given collaborators and settings.
    pub fn new(store: S, sender: N, config: DispatchConfig) -> Self {
        Self {
            store,
            sender,
            config,
            running: AtomicBool::new(false),
        }
    }

    /// Executes one batch run anchored at `now`.
    ///
    /// Returns the run report, or a fatal error when the store is
    /// unreachable or a previous run is still in flight. The run lock and
    /// the store connection are released on every exit path.
    pub fn run(&self, now: DateTime<Utc>) -> Result<DispatchReport, DispatchError> {
        let _guard = RunGuard::acquire(&self.running).ok_or(DispatchError::AlreadyRunning)?;
        let started_at = Instant::now();
        let window = due_window(now, &self.config);
        info!(
            "event=dispatch_run module=notify status=start window_from={} window_to={} workers={} timeout_ms={}",
            window.from,
            window.to,
            self.config.send_workers,
            self.config.send_timeout.as_millis()
        );

        let documents = self.store.list_due_for_review(&window).map_err(|err| {
            error!(
                "event=dispatch_run module=notify status=error duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            );
            DispatchError::from(err)
        })?;

        // Dedupe per document before any send goes out.
        let pairs: Vec<(&Document, &UserRef)> = documents
            .iter()
            .flat_map(|document| {
                document
                    .notification_recipients()
                    .into_iter()
                    .map(move |recipient| (document, recipient))
            })
            .collect();

        let (sent, failures) = self.deliver(&pairs);
        let report = DispatchReport {
            processed: documents.len(),
            sent,
            failures,
        };

        info!(
            "event=dispatch_run module=notify status=ok duration_ms={} processed={} sent={} failed={}",
            started_at.elapsed().as_millis(),
            report.processed,
            report.sent,
            report.failures.len()
        );
        Ok(report)
    }

    fn deliver(&self, pairs: &[(&Document, &UserRef)]) -> (usize, Vec<DispatchFailure>) {
        // Capture only the sender in the workers: the store stays on this
        // thread, so single-connection stores work with any worker count.
        let sender = &self.sender;
        let timeout = self.config.send_timeout;
        let workers = self.config.send_workers.max(1);
        if workers == 1 || pairs.len() <= 1 {
            return deliver_slice(sender, pairs, timeout);
        }

        let chunk_size = pairs.len().div_ceil(workers);
        let mut sent = 0;
        let mut failures = Vec::new();
        std::thread::scope(|scope| {
            let handles: Vec<_> = pairs
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || deliver_slice(sender, chunk, timeout)))
                .collect();
            for handle in handles {
                // A scoped worker only panics if a sender implementation
                // does; propagate rather than undercount.
                let (chunk_sent, chunk_failures) =
                    handle.join().expect("send worker panicked");
                sent += chunk_sent;
                failures.extend(chunk_failures);
            }
        });
        (sent, failures)
    }
}

/// Delivers one slice of pairs, bounding each send by `timeout`.
///
/// A synchronous sender cannot be cancelled mid-call. A send that overruns
/// the deadline is recorded as a timeout for that recipient and the loop
/// moves on; its straggler thread is awaited when the slice finishes.
fn deliver_slice<N: NotificationSender + Sync>(
    sender: &N,
    pairs: &[(&Document, &UserRef)],
    timeout: Duration,
) -> (usize, Vec<DispatchFailure>) {
    let mut sent = 0;
    let mut failures = Vec::new();
    std::thread::scope(|scope| {
        for (document, recipient) in pairs {
            let (tx, rx) = mpsc::channel();
            scope.spawn(move || {
                // The receiver is gone after a timeout; nobody cares then.
                let _ = tx.send(sender.send(recipient, document));
            });
            let outcome = rx
                .recv_timeout(timeout)
                .unwrap_or(Err(SendError::Timeout { after: timeout }));
            match outcome {
                Ok(()) => sent += 1,
                Err(err) => {
                    warn!(
                        "event=notify_send module=notify status=error document={} recipient={} error={err}",
                        document.uuid, recipient.id
                    );
                    failures.push(DispatchFailure {
                        document_id: document.uuid,
                        recipient_id: recipient.id,
                        error: err.to_string(),
                    });
                }
            }
        }
    });
    (sent, failures)
}

/// Candidate window `[now, start-of-day(now + horizon))`.
///
/// Truncating the upper bound to its calendar day keeps the query meaning
/// "due within the next calendar day" for the default 24-hour horizon.
pub fn due_window(now: DateTime<Utc>, config: &DispatchConfig) -> DueWindow {
    let upper = now
        .checked_add_signed(config.horizon)
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    DueWindow {
        from: now,
        to: upper.date_naive().and_time(NaiveTime::MIN).and_utc(),
    }
}

struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::due_window;
    use crate::config::DispatchConfig;
    use chrono::{DateTime, Duration, Utc};

    fn date(value: &str) -> DateTime<Utc> {
        value.parse().unwrap()
    }

    #[test]
    fn window_upper_bound_truncates_to_calendar_day() {
        let config = DispatchConfig::default();
        let window = due_window(date("2024-05-01T10:30:00Z"), &config);
        assert_eq!(window.from, date("2024-05-01T10:30:00Z"));
        assert_eq!(window.to, date("2024-05-02T00:00:00Z"));
    }

    #[test]
    fn window_at_midnight_spans_exactly_one_day() {
        let config = DispatchConfig::default();
        let window = due_window(date("2024-05-01T00:00:00Z"), &config);
        assert_eq!(window.to, date("2024-05-02T00:00:00Z"));
    }

    #[test]
    fn short_horizon_can_collapse_the_window() {
        let config = DispatchConfig {
            horizon: Duration::hours(1),
            ..DispatchConfig::default()
        };
        // 23:30 + 1h lands in the next day; truncation keeps the bound there.
        let late = due_window(date("2024-05-01T23:30:00Z"), &config);
        assert_eq!(late.to, date("2024-05-02T00:00:00Z"));

        // Mid-day the truncated bound falls before "now": an empty window,
        // which the store query answers with no rows.
        let midday = due_window(date("2024-05-01T12:00:00Z"), &config);
        assert!(midday.to < midday.from);
    }
}
