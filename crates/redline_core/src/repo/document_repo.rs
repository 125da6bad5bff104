//! Document store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide the document read/write API consumed by the service layer and
//!   the notification dispatcher.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths validate the aggregate before SQL mutations.
//! - Every mutation checks the caller's `revision` token and increments it;
//!   a mismatch is a `RevisionConflict`, never a silent overwrite.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::assignment::{Assignee, AssigneeStatus, ReviewAssignment};
use crate::model::document::{
    Document, DocumentId, PolicyValidationError, ReviewInterval, ReviewPeriod, ReviewPolicy,
    UserRef,
};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const DOCUMENT_SELECT_SQL: &str = "SELECT
    uuid,
    title,
    opens_for_review,
    review_interval,
    review_interval_days,
    review_period,
    last_reviewed_on,
    next_review_due_on,
    review_completed,
    revision
FROM documents";

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for document persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(PolicyValidationError),
    Db(DbError),
    NotFound(DocumentId),
    /// Another writer mutated the document since it was read.
    RevisionConflict {
        document: DocumentId,
        expected: i64,
    },
    /// The connection has not been migrated to the schema this binary needs.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "document not found: {id}"),
            Self::RevisionConflict { document, expected } => write!(
                f,
                "document {document} moved past revision {expected}; reload and retry"
            ),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match required {expected_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted document data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PolicyValidationError> for RepoError {
    fn from(value: PolicyValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Half-open due-date range `[from, to)` for dispatch candidate queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Store interface consumed by the service layer and the dispatcher.
pub trait DocumentStore {
    fn create_document(&self, document: &Document) -> RepoResult<DocumentId>;
    fn get_document(&self, id: DocumentId) -> RepoResult<Option<Document>>;
    fn list_documents(&self) -> RepoResult<Vec<Document>>;
    /// Documents with a due date inside `window` whose current cycle is not
    /// yet completed. Documents without a computed due date never match.
    fn list_due_for_review(&self, window: &DueWindow) -> RepoResult<Vec<Document>>;
    /// Persists policy columns; returns the incremented revision.
    fn update_policy(
        &self,
        id: DocumentId,
        policy: &ReviewPolicy,
        expected_revision: i64,
    ) -> RepoResult<i64>;
    /// Replaces the assignee set; returns the incremented revision.
    fn update_assignment(
        &self,
        id: DocumentId,
        assignment: &ReviewAssignment,
        expected_revision: i64,
    ) -> RepoResult<i64>;
    /// Persists policy and assignee set in one transaction; returns the
    /// incremented revision. Used for cycle transitions.
    fn update_review_state(
        &self,
        id: DocumentId,
        policy: &ReviewPolicy,
        assignment: &ReviewAssignment,
        expected_revision: i64,
    ) -> RepoResult<i64>;
}

/// SQLite-backed document store.
pub struct SqliteDocumentStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDocumentStore<'conn> {
    /// Wraps a migrated connection.
    ///
    /// Rejects connections whose schema version does not match this binary,
    /// so callers cannot accidentally run against an unmigrated file.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let expected_version = latest_version();
        let actual_version =
            conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self { conn })
    }

    fn load_assignment(&self, id: DocumentId) -> RepoResult<ReviewAssignment> {
        let mut stmt = self.conn.prepare(
            "SELECT assignee_uuid, status, completed_at
             FROM assignees
             WHERE document_uuid = ?1
             ORDER BY position ASC;",
        )?;

        let mut rows = stmt.query(params![id.to_string()])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_assignee_row(row)?);
        }

        ReviewAssignment::from_records(records).ok_or_else(|| {
            RepoError::InvalidData(format!("duplicate assignee rows for document {id}"))
        })
    }

    fn load_people(&self, id: DocumentId, role: &str) -> RepoResult<Vec<UserRef>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_uuid, display_name, contact_address
             FROM document_people
             WHERE document_uuid = ?1 AND role = ?2
             ORDER BY position ASC;",
        )?;

        let mut rows = stmt.query(params![id.to_string(), role])?;
        let mut people = Vec::new();
        while let Some(row) = rows.next()? {
            let uuid_text: String = row.get("user_uuid")?;
            people.push(UserRef {
                id: parse_uuid(&uuid_text, "document_people.user_uuid")?,
                display_name: row.get("display_name")?,
                contact_address: row.get("contact_address")?,
            });
        }
        Ok(people)
    }

    fn hydrate(&self, row: &Row<'_>) -> RepoResult<Document> {
        let mut document = parse_document_row(row)?;
        document.assignment = self.load_assignment(document.uuid)?;
        document.stakeholders = self.load_people(document.uuid, "stakeholder")?;
        document.owners = self.load_people(document.uuid, "owner")?;
        Ok(document)
    }

    fn collect_documents(
        &self,
        sql: &str,
        bind: &[&dyn rusqlite::ToSql],
    ) -> RepoResult<Vec<Document>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(bind)?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            documents.push(self.hydrate(row)?);
        }
        Ok(documents)
    }

    fn replace_assignees(&self, id: DocumentId, assignment: &ReviewAssignment) -> RepoResult<()> {
        self.conn.execute(
            "DELETE FROM assignees WHERE document_uuid = ?1;",
            params![id.to_string()],
        )?;
        for (position, assignee) in assignment.assignees().iter().enumerate() {
            self.conn.execute(
                "INSERT INTO assignees (
                    document_uuid, assignee_uuid, status, completed_at, position
                ) VALUES (?1, ?2, ?3, ?4, ?5);",
                params![
                    id.to_string(),
                    assignee.assignee_id.to_string(),
                    status_to_db(assignee.status),
                    assignee.completed_at.map(to_millis),
                    position as i64,
                ],
            )?;
        }
        Ok(())
    }

    fn insert_people(&self, id: DocumentId, role: &str, people: &[UserRef]) -> RepoResult<()> {
        for (position, person) in people.iter().enumerate() {
            self.conn.execute(
                "INSERT INTO document_people (
                    document_uuid, user_uuid, role, display_name, contact_address, position
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                params![
                    id.to_string(),
                    person.id.to_string(),
                    role,
                    person.display_name.as_str(),
                    person.contact_address.as_str(),
                    position as i64,
                ],
            )?;
        }
        Ok(())
    }

    /// Applies the revision-guarded policy UPDATE; returns the new revision.
    fn write_policy(
        &self,
        id: DocumentId,
        policy: &ReviewPolicy,
        expected_revision: i64,
    ) -> RepoResult<i64> {
        let changed = self.conn.execute(
            "UPDATE documents
             SET
                opens_for_review = ?1,
                review_interval = ?2,
                review_interval_days = ?3,
                review_period = ?4,
                last_reviewed_on = ?5,
                next_review_due_on = ?6,
                review_completed = ?7,
                revision = revision + 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?8 AND revision = ?9;",
            params![
                policy.opens_for_review.map(to_millis),
                policy.review_interval.map(interval_to_db),
                policy.review_interval_days,
                policy.review_period.map(period_to_db),
                policy.last_reviewed_on.map(to_millis),
                policy.next_review_due_on.map(to_millis),
                bool_to_int(policy.review_completed),
                id.to_string(),
                expected_revision,
            ],
        )?;

        if changed == 0 {
            return Err(self.stale_write_error(id, expected_revision));
        }
        Ok(expected_revision + 1)
    }

    /// Bumps only the revision token; used when a mutation touches child
    /// tables but no policy column.
    fn bump_revision(&self, id: DocumentId, expected_revision: i64) -> RepoResult<i64> {
        let changed = self.conn.execute(
            "UPDATE documents
             SET revision = revision + 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1 AND revision = ?2;",
            params![id.to_string(), expected_revision],
        )?;

        if changed == 0 {
            return Err(self.stale_write_error(id, expected_revision));
        }
        Ok(expected_revision + 1)
    }

    /// Disambiguates a zero-row UPDATE: missing document vs stale revision.
    fn stale_write_error(&self, id: DocumentId, expected: i64) -> RepoError {
        match self.conn.query_row(
            "SELECT 1 FROM documents WHERE uuid = ?1;",
            params![id.to_string()],
            |_| Ok(()),
        ) {
            Ok(()) => RepoError::RevisionConflict {
                document: id,
                expected,
            },
            Err(rusqlite::Error::QueryReturnedNoRows) => RepoError::NotFound(id),
            Err(other) => other.into(),
        }
    }
}

impl DocumentStore for SqliteDocumentStore<'_> {
    fn create_document(&self, document: &Document) -> RepoResult<DocumentId> {
        document.validate()?;

        let tx = self.conn.unchecked_transaction()?;
        self.conn.execute(
            "INSERT INTO documents (
                uuid,
                title,
                opens_for_review,
                review_interval,
                review_interval_days,
                review_period,
                last_reviewed_on,
                next_review_due_on,
                review_completed,
                revision
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                document.uuid.to_string(),
                document.title.as_str(),
                document.policy.opens_for_review.map(to_millis),
                document.policy.review_interval.map(interval_to_db),
                document.policy.review_interval_days,
                document.policy.review_period.map(period_to_db),
                document.policy.last_reviewed_on.map(to_millis),
                document.policy.next_review_due_on.map(to_millis),
                bool_to_int(document.policy.review_completed),
                document.revision,
            ],
        )?;
        self.replace_assignees(document.uuid, &document.assignment)?;
        self.insert_people(document.uuid, "stakeholder", &document.stakeholders)?;
        self.insert_people(document.uuid, "owner", &document.owners)?;
        tx.commit()?;

        Ok(document.uuid)
    }

    fn get_document(&self, id: DocumentId) -> RepoResult<Option<Document>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{DOCUMENT_SELECT_SQL} WHERE uuid = ?1;"))?;

        let mut rows = stmt.query(params![id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(self.hydrate(row)?));
        }
        Ok(None)
    }

    fn list_documents(&self) -> RepoResult<Vec<Document>> {
        self.collect_documents(
            &format!("{DOCUMENT_SELECT_SQL} ORDER BY updated_at DESC, uuid ASC;"),
            params![],
        )
    }

    fn list_due_for_review(&self, window: &DueWindow) -> RepoResult<Vec<Document>> {
        let from = to_millis(window.from);
        let to = to_millis(window.to);
        self.collect_documents(
            &format!(
                "{DOCUMENT_SELECT_SQL}
                 WHERE review_completed = 0
                   AND next_review_due_on IS NOT NULL
                   AND next_review_due_on >= ?1
                   AND next_review_due_on < ?2
                 ORDER BY next_review_due_on ASC, uuid ASC;"
            ),
            params![from, to],
        )
    }

    fn update_policy(
        &self,
        id: DocumentId,
        policy: &ReviewPolicy,
        expected_revision: i64,
    ) -> RepoResult<i64> {
        policy.validate()?;
        let tx = self.conn.unchecked_transaction()?;
        let revision = self.write_policy(id, policy, expected_revision)?;
        tx.commit()?;
        Ok(revision)
    }

    fn update_assignment(
        &self,
        id: DocumentId,
        assignment: &ReviewAssignment,
        expected_revision: i64,
    ) -> RepoResult<i64> {
        let tx = self.conn.unchecked_transaction()?;
        let revision = self.bump_revision(id, expected_revision)?;
        self.replace_assignees(id, assignment)?;
        tx.commit()?;
        Ok(revision)
    }

    fn update_review_state(
        &self,
        id: DocumentId,
        policy: &ReviewPolicy,
        assignment: &ReviewAssignment,
        expected_revision: i64,
    ) -> RepoResult<i64> {
        policy.validate()?;
        let tx = self.conn.unchecked_transaction()?;
        let revision = self.write_policy(id, policy, expected_revision)?;
        self.replace_assignees(id, assignment)?;
        tx.commit()?;
        Ok(revision)
    }
}

fn parse_document_row(row: &Row<'_>) -> RepoResult<Document> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = parse_uuid(&uuid_text, "documents.uuid")?;

    let review_interval = match row.get::<_, Option<String>>("review_interval")? {
        Some(value) => Some(parse_interval(&value).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid interval `{value}` in documents.review_interval"
            ))
        })?),
        None => None,
    };

    let review_period = match row.get::<_, Option<String>>("review_period")? {
        Some(value) => Some(parse_period(&value).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid period `{value}` in documents.review_period"
            ))
        })?),
        None => None,
    };

    let review_completed = match row.get::<_, i64>("review_completed")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid review_completed value `{other}` in documents.review_completed"
            )));
        }
    };

    let policy = ReviewPolicy {
        opens_for_review: read_millis(row, "opens_for_review")?,
        review_interval,
        review_interval_days: row.get("review_interval_days")?,
        review_period,
        last_reviewed_on: read_millis(row, "last_reviewed_on")?,
        next_review_due_on: read_millis(row, "next_review_due_on")?,
        review_completed,
    };

    let mut document = Document::with_id(uuid, row.get::<_, String>("title")?);
    document.policy = policy;
    document.revision = row.get("revision")?;
    document.validate()?;
    Ok(document)
}

fn parse_assignee_row(row: &Row<'_>) -> RepoResult<Assignee> {
    let uuid_text: String = row.get("assignee_uuid")?;
    let status_text: String = row.get("status")?;
    let status = parse_status(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid assignee status `{status_text}` in assignees.status"
        ))
    })?;

    Ok(Assignee {
        assignee_id: parse_uuid(&uuid_text, "assignees.assignee_uuid")?,
        status,
        completed_at: read_millis(row, "completed_at")?,
    })
}

fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

fn read_millis(row: &Row<'_>, column: &str) -> RepoResult<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(column)? {
        Some(millis) => {
            let parsed = Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
                RepoError::InvalidData(format!("invalid timestamp `{millis}` in {column}"))
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn to_millis(value: DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

fn interval_to_db(interval: ReviewInterval) -> &'static str {
    match interval {
        ReviewInterval::Monthly => "monthly",
        ReviewInterval::Quarterly => "quarterly",
        ReviewInterval::Semiannually => "semiannually",
        ReviewInterval::Annually => "annually",
        ReviewInterval::Custom => "custom",
    }
}

fn parse_interval(value: &str) -> Option<ReviewInterval> {
    match value {
        "monthly" => Some(ReviewInterval::Monthly),
        "quarterly" => Some(ReviewInterval::Quarterly),
        "semiannually" => Some(ReviewInterval::Semiannually),
        "annually" => Some(ReviewInterval::Annually),
        "custom" => Some(ReviewInterval::Custom),
        _ => None,
    }
}

fn period_to_db(period: ReviewPeriod) -> &'static str {
    match period {
        ReviewPeriod::OneWeek => "1week",
        ReviewPeriod::TwoWeeks => "2weeks",
        ReviewPeriod::ThreeWeeks => "3weeks",
        ReviewPeriod::OneMonth => "1month",
    }
}

fn parse_period(value: &str) -> Option<ReviewPeriod> {
    match value {
        "1week" => Some(ReviewPeriod::OneWeek),
        "2weeks" => Some(ReviewPeriod::TwoWeeks),
        "3weeks" => Some(ReviewPeriod::ThreeWeeks),
        "1month" => Some(ReviewPeriod::OneMonth),
        _ => None,
    }
}

fn status_to_db(status: AssigneeStatus) -> &'static str {
    match status {
        AssigneeStatus::Pending => "pending",
        AssigneeStatus::Completed => "completed",
    }
}

fn parse_status(value: &str) -> Option<AssigneeStatus> {
    match value {
        "pending" => Some(AssigneeStatus::Pending),
        "completed" => Some(AssigneeStatus::Completed),
        _ => None,
    }
}

fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}
