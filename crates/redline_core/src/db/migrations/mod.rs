//! SQLite schema migrations.
//!
//! A migration's version is its position in [`MIGRATIONS`], so ordering can
//! never drift from the registry. The applied version is mirrored to
//! `PRAGMA user_version`.

use crate::db::{DbError, DbResult};
use rusqlite::Connection;

const MIGRATIONS: &[&str] = &[
    include_str!("0001_documents.sql"),
    include_str!("0002_review_people.sql"),
];

/// Returns the latest schema version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.len() as u32
}

/// Applies all pending migrations on the provided connection.
///
/// A database written by a newer binary is refused rather than touched.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let current = current_user_version(conn)?;
    let latest = latest_version();

    if current > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }
    if current == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (index, sql) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        tx.execute_batch(sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", index + 1))?;
    }
    tx.commit()?;

    Ok(())
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
