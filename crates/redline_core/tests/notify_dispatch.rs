use chrono::{DateTime, Utc};
use redline_core::db::open_db_in_memory;
use redline_core::{
    DispatchConfig, DispatchError, Document, DocumentId, DocumentStore, DueWindow,
    NotificationDispatcher, NotificationSender, RepoError, ReviewAssignment, ReviewPeriod,
    ReviewPolicy, SendError, SqliteDocumentStore, UserId, UserRef,
};
use std::sync::mpsc;
use std::sync::Mutex;
use uuid::Uuid;

fn date(value: &str) -> DateTime<Utc> {
    value.parse().unwrap()
}

fn user_with_id(id: UserId, name: &str) -> UserRef {
    UserRef {
        id,
        display_name: name.to_string(),
        contact_address: format!("{name}@example.com"),
    }
}

fn user(name: &str) -> UserRef {
    user_with_id(Uuid::new_v4(), name)
}

fn due_document(title: &str, due: DateTime<Utc>) -> Document {
    let mut document = Document::new(title);
    document.policy = ReviewPolicy {
        next_review_due_on: Some(due),
        ..ReviewPolicy::default()
    };
    document
}

/// In-memory stand-in for the external document store.
struct StubStore {
    documents: Vec<Document>,
    fail_listing: bool,
}

impl StubStore {
    fn with_documents(documents: Vec<Document>) -> Self {
        Self {
            documents,
            fail_listing: false,
        }
    }

    fn failing() -> Self {
        Self {
            documents: Vec::new(),
            fail_listing: true,
        }
    }
}

impl DocumentStore for StubStore {
    fn create_document(&self, document: &Document) -> Result<DocumentId, RepoError> {
        Ok(document.uuid)
    }

    fn get_document(&self, id: DocumentId) -> Result<Option<Document>, RepoError> {
        Ok(self.documents.iter().find(|d| d.uuid == id).cloned())
    }

    fn list_documents(&self) -> Result<Vec<Document>, RepoError> {
        Ok(self.documents.clone())
    }

    fn list_due_for_review(&self, window: &DueWindow) -> Result<Vec<Document>, RepoError> {
        if self.fail_listing {
            return Err(RepoError::InvalidData("store offline".to_string()));
        }
        Ok(self
            .documents
            .iter()
            .filter(|document| {
                !document.policy.review_completed
                    && document
                        .policy
                        .next_review_due_on
                        .is_some_and(|due| due >= window.from && due < window.to)
            })
            .cloned()
            .collect())
    }

    fn update_policy(
        &self,
        _id: DocumentId,
        _policy: &ReviewPolicy,
        expected_revision: i64,
    ) -> Result<i64, RepoError> {
        Ok(expected_revision + 1)
    }

    fn update_assignment(
        &self,
        _id: DocumentId,
        _assignment: &ReviewAssignment,
        expected_revision: i64,
    ) -> Result<i64, RepoError> {
        Ok(expected_revision + 1)
    }

    fn update_review_state(
        &self,
        _id: DocumentId,
        _policy: &ReviewPolicy,
        _assignment: &ReviewAssignment,
        expected_revision: i64,
    ) -> Result<i64, RepoError> {
        Ok(expected_revision + 1)
    }
}

/// Records every delivered pair; optionally fails one recipient.
struct RecordingSender {
    sent: Mutex<Vec<(DocumentId, UserId)>>,
    reject: Option<UserId>,
}

impl RecordingSender {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reject: None,
        }
    }

    fn rejecting(recipient: UserId) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reject: Some(recipient),
        }
    }

    fn sent_pairs(&self) -> Vec<(DocumentId, UserId)> {
        self.sent.lock().unwrap().clone()
    }
}

impl NotificationSender for RecordingSender {
    fn send(&self, recipient: &UserRef, document: &Document) -> Result<(), SendError> {
        if self.reject == Some(recipient.id) {
            return Err(SendError::Rejected("mailbox unavailable".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((document.uuid, recipient.id));
        Ok(())
    }
}

fn noon() -> DateTime<Utc> {
    date("2024-05-01T12:00:00Z")
}

fn due_today() -> DateTime<Utc> {
    date("2024-05-01T18:00:00Z")
}

#[test]
fn recipients_shared_between_roles_get_exactly_one_send() {
    // Doc one lists three people across roles but only two identities;
    // doc two has three distinct people. 6 listed slots, 5 unique pairs.
    let shared = Uuid::new_v4();
    let mut doc_one = due_document("handbook", due_today());
    doc_one.stakeholders = vec![user("ada"), user_with_id(shared, "bo")];
    doc_one.owners = vec![user_with_id(shared, "bo")];

    let mut doc_two = due_document("runbook", due_today());
    doc_two.stakeholders = vec![user("cy"), user("dee")];
    doc_two.owners = vec![user("eli")];

    let store = StubStore::with_documents(vec![doc_one.clone(), doc_two.clone()]);
    let sender = RecordingSender::new();
    let dispatcher = NotificationDispatcher::new(store, sender, DispatchConfig::default());

    let report = dispatcher.run(noon()).unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.sent, 5);
    assert!(report.failures.is_empty());
}

#[test]
fn one_failed_recipient_does_not_abort_the_batch() {
    let unlucky = Uuid::new_v4();
    let mut document = due_document("handbook", due_today());
    document.stakeholders = vec![user("ada"), user_with_id(unlucky, "bo")];
    document.owners = vec![user("cy")];

    let store = StubStore::with_documents(vec![document.clone()]);
    let sender = RecordingSender::rejecting(unlucky);
    let dispatcher = NotificationDispatcher::new(store, sender, DispatchConfig::default());

    let report = dispatcher.run(noon()).unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.sent, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].document_id, document.uuid);
    assert_eq!(report.failures[0].recipient_id, unlucky);
    assert!(report.failures[0].error.contains("rejected"));
}

#[test]
fn documents_outside_the_window_are_not_processed() {
    let mut due_doc = due_document("due", due_today());
    due_doc.owners = vec![user("ada")];

    let mut tomorrow_doc = due_document("later", date("2024-05-02T09:00:00Z"));
    tomorrow_doc.owners = vec![user("bo")];

    let mut finished_doc = due_document("finished", due_today());
    finished_doc.policy.review_completed = true;
    finished_doc.owners = vec![user("cy")];

    let store = StubStore::with_documents(vec![
        due_doc.clone(),
        tomorrow_doc,
        finished_doc,
    ]);
    let sender = RecordingSender::new();
    let dispatcher = NotificationDispatcher::new(store, sender, DispatchConfig::default());

    let report = dispatcher.run(noon()).unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.sent, 1);
}

#[test]
fn unreachable_store_aborts_the_whole_run() {
    let dispatcher = NotificationDispatcher::new(
        StubStore::failing(),
        RecordingSender::new(),
        DispatchConfig::default(),
    );

    let err = dispatcher.run(noon()).unwrap_err();
    assert!(matches!(err, DispatchError::Store(_)));

    // The run lock was released on the error path; the next run proceeds.
    let dispatcher = NotificationDispatcher::new(
        StubStore::with_documents(Vec::new()),
        RecordingSender::new(),
        DispatchConfig::default(),
    );
    assert!(dispatcher.run(noon()).is_ok());
}

#[test]
fn bounded_worker_pool_delivers_every_pair() {
    let mut documents = Vec::new();
    for index in 0..6 {
        let mut document = due_document(&format!("doc-{index}"), due_today());
        document.owners = vec![user("owner"), user("backup")];
        documents.push(document);
    }

    let store = StubStore::with_documents(documents);
    let sender = RecordingSender::new();
    let config = DispatchConfig {
        send_workers: 4,
        ..DispatchConfig::default()
    };
    let dispatcher = NotificationDispatcher::new(store, sender, config);

    let report = dispatcher.run(noon()).unwrap();

    assert_eq!(report.processed, 6);
    assert_eq!(report.sent, 12);
    assert!(report.failures.is_empty());
}

/// Sender that is slow for exactly one recipient.
struct SlowSender {
    slow: UserId,
    delay: std::time::Duration,
}

impl NotificationSender for SlowSender {
    fn send(&self, recipient: &UserRef, _document: &Document) -> Result<(), SendError> {
        if recipient.id == self.slow {
            std::thread::sleep(self.delay);
        }
        Ok(())
    }
}

#[test]
fn a_send_overrunning_the_deadline_is_a_recoverable_timeout() {
    let sluggish = Uuid::new_v4();
    let mut document = due_document("handbook", due_today());
    document.stakeholders = vec![user("ada")];
    document.owners = vec![user_with_id(sluggish, "bo")];

    let store = StubStore::with_documents(vec![document.clone()]);
    let sender = SlowSender {
        slow: sluggish,
        delay: std::time::Duration::from_millis(400),
    };
    let config = DispatchConfig {
        send_timeout: std::time::Duration::from_millis(50),
        ..DispatchConfig::default()
    };
    let dispatcher = NotificationDispatcher::new(store, sender, config);

    let report = dispatcher.run(noon()).unwrap();

    // The fast recipient is unaffected; the slow one is a per-recipient
    // failure, not a run abort.
    assert_eq!(report.sent, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].recipient_id, sluggish);
    assert!(report.failures[0].error.contains("timed out"));
}

/// Sender that parks on its first send until the test releases it.
struct GateSender {
    started: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl NotificationSender for GateSender {
    fn send(&self, _recipient: &UserRef, _document: &Document) -> Result<(), SendError> {
        self.started.lock().unwrap().send(()).unwrap();
        self.release.lock().unwrap().recv().unwrap();
        Ok(())
    }
}

#[test]
fn overlapping_runs_are_rejected_while_one_is_in_flight() {
    let mut document = due_document("handbook", due_today());
    document.owners = vec![user("ada")];

    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let dispatcher = NotificationDispatcher::new(
        StubStore::with_documents(vec![document]),
        GateSender {
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
        },
        DispatchConfig::default(),
    );

    std::thread::scope(|scope| {
        let in_flight = scope.spawn(|| dispatcher.run(noon()));

        // Wait until the first run is mid-send, then trigger the overlap.
        started_rx.recv().unwrap();
        let overlap = dispatcher.run(noon());
        assert!(matches!(overlap, Err(DispatchError::AlreadyRunning)));

        release_tx.send(()).unwrap();
        let report = in_flight.join().unwrap().unwrap();
        assert_eq!(report.sent, 1);
    });

    // With the first run finished the lock is free again; queue the gate
    // release up front so the next send does not park.
    release_tx.send(()).unwrap();
    let rerun = dispatcher.run(noon()).unwrap();
    assert_eq!(rerun.sent, 1);
    started_rx.recv().unwrap();
}

#[test]
fn report_serializes_for_machine_consumers() {
    let mut document = due_document("handbook", due_today());
    let unlucky = Uuid::new_v4();
    document.owners = vec![user("ada"), user_with_id(unlucky, "bo")];

    let store = StubStore::with_documents(vec![document]);
    let dispatcher = NotificationDispatcher::new(
        store,
        RecordingSender::rejecting(unlucky),
        DispatchConfig::default(),
    );

    let report = dispatcher.run(noon()).unwrap();
    let json: serde_json::Value = serde_json::to_value(&report).unwrap();

    assert_eq!(json["processed"], 1);
    assert_eq!(json["sent"], 1);
    assert_eq!(json["failures"].as_array().unwrap().len(), 1);
    assert!(json["failures"][0]["error"].is_string());
}

#[test]
fn dispatch_runs_end_to_end_over_the_sqlite_store() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::try_new(&conn).unwrap();

    let mut document = due_document("handbook", due_today());
    document.policy.opens_for_review = Some(date("2024-04-24T18:00:00Z"));
    document.policy.review_period = Some(ReviewPeriod::OneWeek);
    document.stakeholders = vec![user("ada")];
    document.owners = vec![user("bo")];
    store.create_document(&document).unwrap();

    let sender = RecordingSender::new();
    let dispatcher = NotificationDispatcher::new(store, sender, DispatchConfig::default());

    let report = dispatcher.run(noon()).unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.sent, 2);
}

#[test]
fn recorded_pairs_match_the_report() {
    let shared = Uuid::new_v4();
    let owner = Uuid::new_v4();
    let mut document = due_document("handbook", due_today());
    document.stakeholders = vec![user_with_id(shared, "ada")];
    document.owners = vec![user_with_id(shared, "ada"), user_with_id(owner, "bo")];

    let store = StubStore::with_documents(vec![document.clone()]);
    let sender = RecordingSender::new();
    let dispatcher = NotificationDispatcher::new(store, &sender, DispatchConfig::default());

    let report = dispatcher.run(noon()).unwrap();
    assert_eq!(report.sent, 2);

    let pairs = sender.sent_pairs();
    assert_eq!(pairs, vec![(document.uuid, shared), (document.uuid, owner)]);
}
