//! Durable record of applied actions.
//!
//! # Table design
//!
//! ```text
//! id          INTEGER PRIMARY KEY
//! identifier  TEXT    NOT NULL UNIQUE
//! batch       INTEGER NOT NULL
//! applied_at  TEXT    NOT NULL DEFAULT CURRENT_TIMESTAMP
//! ```
//!
//! Every call goes straight to the database; nothing is cached, so rows
//! written by another process are visible on the next call.
//!
//! `record_on`/`remove_on` write through a caller's handle to the same
//! database, so the entry commits or rolls back with the caller's open
//! transaction.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::Serialize;

use crate::connection::open_database;
use crate::error::{ActionsError, Result};
use crate::paths;

// ---------------------------------------------------------------------------
// LedgerEntry
// ---------------------------------------------------------------------------

/// One completed application of an action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub identifier: String,
    pub batch: u32,
    pub applied_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

pub trait Ledger {
    /// Create the backing table if it does not exist yet.
    fn install(&self) -> Result<()>;

    fn has(&self, identifier: &str) -> Result<bool>;

    /// Fails with `DuplicateEntry` if `identifier` is already recorded.
    fn record(&self, identifier: &str, batch: u32) -> Result<()>;

    /// Fails with `EntryNotFound` if `identifier` is not recorded.
    fn remove(&self, identifier: &str) -> Result<()>;

    /// Database file holding the ledger, when it lives in one.
    fn location(&self) -> Option<&Path> {
        None
    }

    /// [`Ledger::record`] through `conn`, which must point at
    /// [`Ledger::location`].
    fn record_on(&self, conn: &Connection, identifier: &str, batch: u32) -> Result<()> {
        let _ = conn;
        self.record(identifier, batch)
    }

    /// [`Ledger::remove`] through `conn`, which must point at
    /// [`Ledger::location`].
    fn remove_on(&self, conn: &Connection, identifier: &str) -> Result<()> {
        let _ = conn;
        self.remove(identifier)
    }

    /// Highest recorded batch, or 0 when empty.
    fn last_batch(&self) -> Result<u32>;

    /// Identifiers in `batch`, most recently applied first.
    fn entries_in_batch(&self, batch: u32) -> Result<Vec<String>>;

    /// Every entry, ordered by batch then identifier.
    fn entries(&self) -> Result<Vec<LedgerEntry>>;
}

// ---------------------------------------------------------------------------
// SqliteLedger
// ---------------------------------------------------------------------------

pub struct SqliteLedger {
    conn: Connection,
    table: String,
    location: Option<PathBuf>,
}

impl SqliteLedger {
    /// Wrap `conn`, creating `table` if needed.
    pub fn open(conn: Connection, table: &str) -> Result<Self> {
        paths::validate_table(table)?;
        let ledger = Self {
            conn,
            table: table.to_string(),
            location: None,
        };
        ledger.install()?;
        Ok(ledger)
    }

    pub fn open_path(path: &Path, table: &str) -> Result<Self> {
        let mut ledger = Self::open(open_database(path)?, table)?;
        if path != Path::new(":memory:") {
            ledger.location = Some(path.to_path_buf());
        }
        Ok(ledger)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn contains(&self, conn: &Connection, identifier: &str) -> Result<bool> {
        let found = conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE identifier = ?1", self.table),
                [identifier],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert(&self, conn: &Connection, identifier: &str, batch: u32) -> Result<()> {
        if self.contains(conn, identifier)? {
            return Err(ActionsError::DuplicateEntry(identifier.to_string()));
        }
        let inserted = conn.execute(
            &format!(
                "INSERT INTO {} (identifier, batch, applied_at) VALUES (?1, ?2, ?3)",
                self.table
            ),
            params![identifier, batch, now_stamp()],
        );
        match inserted {
            Ok(_) => Ok(()),
            // Another writer got there between the check and the insert.
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(ActionsError::DuplicateEntry(identifier.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, conn: &Connection, identifier: &str) -> Result<()> {
        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE identifier = ?1", self.table),
            [identifier],
        )?;
        if removed == 0 {
            return Err(ActionsError::EntryNotFound(identifier.to_string()));
        }
        Ok(())
    }
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Rows written by this crate carry RFC 3339; rows that fell back to the
/// column default carry SQLite's `CURRENT_TIMESTAMP` format.
fn parse_applied_at(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|n| n.and_utc()),
    }
}

impl Ledger for SqliteLedger {
    fn install(&self) -> Result<()> {
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {t} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                identifier TEXT NOT NULL UNIQUE,
                batch INTEGER NOT NULL,
                applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS {t}_batch ON {t} (batch);",
            t = self.table
        ))?;
        Ok(())
    }

    fn has(&self, identifier: &str) -> Result<bool> {
        self.contains(&self.conn, identifier)
    }

    fn record(&self, identifier: &str, batch: u32) -> Result<()> {
        self.insert(&self.conn, identifier, batch)
    }

    fn remove(&self, identifier: &str) -> Result<()> {
        self.delete(&self.conn, identifier)
    }

    fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    fn record_on(&self, conn: &Connection, identifier: &str, batch: u32) -> Result<()> {
        self.insert(conn, identifier, batch)
    }

    fn remove_on(&self, conn: &Connection, identifier: &str) -> Result<()> {
        self.delete(conn, identifier)
    }

    fn last_batch(&self) -> Result<u32> {
        let batch = self.conn.query_row(
            &format!("SELECT COALESCE(MAX(batch), 0) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(batch)
    }

    fn entries_in_batch(&self, batch: u32) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT identifier FROM {} WHERE batch = ?1 ORDER BY identifier DESC",
            self.table
        ))?;
        let ids = stmt
            .query_map([batch], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT identifier, batch, applied_at FROM {} ORDER BY batch, identifier",
            self.table
        ))?;
        let entries = stmt
            .query_map([], |row| {
                let raw: String = row.get(2)?;
                let applied_at = parse_applied_at(&raw).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
                })?;
                Ok(LedgerEntry {
                    identifier: row.get(0)?,
                    batch: row.get(1)?,
                    applied_at,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn memory_ledger() -> SqliteLedger {
        SqliteLedger::open(Connection::open_in_memory().unwrap(), "action_ledger").unwrap()
    }

    #[test]
    fn empty_ledger() {
        let ledger = memory_ledger();
        assert_eq!(ledger.last_batch().unwrap(), 0);
        assert!(!ledger.has("2024_01_01_000000_create_x").unwrap());
        assert!(ledger.entries().unwrap().is_empty());
        assert!(ledger.entries_in_batch(1).unwrap().is_empty());
    }

    #[test]
    fn record_then_has() {
        let ledger = memory_ledger();
        ledger.record("2024_01_01_000000_create_x", 1).unwrap();
        assert!(ledger.has("2024_01_01_000000_create_x").unwrap());
        assert_eq!(ledger.last_batch().unwrap(), 1);

        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].batch, 1);
        assert!(entries[0].applied_at <= Utc::now());
    }

    #[test]
    fn duplicate_record_fails_and_keeps_one_entry() {
        let ledger = memory_ledger();
        ledger.record("2024_01_01_000000_create_x", 1).unwrap();
        let err = ledger.record("2024_01_01_000000_create_x", 2).unwrap_err();
        assert!(matches!(err, ActionsError::DuplicateEntry(ref id) if id == "2024_01_01_000000_create_x"));
        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].batch, 1);
    }

    #[test]
    fn remove_missing_is_not_found() {
        let ledger = memory_ledger();
        let err = ledger.remove("2024_01_01_000000_create_x").unwrap_err();
        assert!(matches!(err, ActionsError::EntryNotFound(_)));
    }

    #[test]
    fn remove_deletes_entry() {
        let ledger = memory_ledger();
        ledger.record("2024_01_01_000000_create_x", 1).unwrap();
        ledger.remove("2024_01_01_000000_create_x").unwrap();
        assert!(!ledger.has("2024_01_01_000000_create_x").unwrap());
        assert_eq!(ledger.last_batch().unwrap(), 0);
    }

    #[test]
    fn entries_in_batch_newest_first() {
        let ledger = memory_ledger();
        ledger.record("2024_01_01_000000_create_x", 1).unwrap();
        ledger.record("2024_01_03_000000_index_x", 2).unwrap();
        ledger.record("2024_01_02_000000_seed_x", 2).unwrap();
        ledger.record("2024_01_04_000000_tidy_x", 2).unwrap();

        assert_eq!(ledger.last_batch().unwrap(), 2);
        assert_eq!(
            ledger.entries_in_batch(2).unwrap(),
            vec![
                "2024_01_04_000000_tidy_x",
                "2024_01_03_000000_index_x",
                "2024_01_02_000000_seed_x",
            ]
        );
        assert_eq!(
            ledger.entries_in_batch(1).unwrap(),
            vec!["2024_01_01_000000_create_x"]
        );
    }

    #[test]
    fn external_writes_are_visible() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("main.sqlite");
        let a = SqliteLedger::open_path(&path, "action_ledger").unwrap();
        let b = SqliteLedger::open_path(&path, "action_ledger").unwrap();

        a.record("2024_01_01_000000_create_x", 1).unwrap();
        assert!(b.has("2024_01_01_000000_create_x").unwrap());
        assert!(matches!(
            b.record("2024_01_01_000000_create_x", 1),
            Err(ActionsError::DuplicateEntry(_))
        ));
    }

    #[test]
    fn record_on_follows_the_callers_transaction() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("main.sqlite");
        let ledger = SqliteLedger::open_path(&path, "action_ledger").unwrap();
        assert_eq!(ledger.location(), Some(path.as_path()));
        let conn = Connection::open(&path).unwrap();

        let tx = conn.unchecked_transaction().unwrap();
        ledger.record_on(&tx, "2024_01_01_000000_create_x", 1).unwrap();
        tx.rollback().unwrap();
        assert!(!ledger.has("2024_01_01_000000_create_x").unwrap());

        let tx = conn.unchecked_transaction().unwrap();
        ledger.record_on(&tx, "2024_01_01_000000_create_x", 1).unwrap();
        tx.commit().unwrap();
        assert!(ledger.has("2024_01_01_000000_create_x").unwrap());

        let tx = conn.unchecked_transaction().unwrap();
        ledger.remove_on(&tx, "2024_01_01_000000_create_x").unwrap();
        tx.rollback().unwrap();
        assert!(ledger.has("2024_01_01_000000_create_x").unwrap());
    }

    #[test]
    fn in_memory_ledger_has_no_location() {
        assert_eq!(memory_ledger().location(), None);
        let ledger = SqliteLedger::open_path(Path::new(":memory:"), "action_ledger").unwrap();
        assert_eq!(ledger.location(), None);
    }

    #[test]
    fn default_timestamp_rows_parse() {
        let ledger = memory_ledger();
        ledger
            .conn
            .execute(
                "INSERT INTO action_ledger (identifier, batch) VALUES ('2024_01_01_000000_create_x', 1)",
                [],
            )
            .unwrap();
        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].identifier, "2024_01_01_000000_create_x");
    }

    #[test]
    fn install_is_idempotent() {
        let ledger = memory_ledger();
        ledger.record("2024_01_01_000000_create_x", 1).unwrap();
        ledger.install().unwrap();
        assert!(ledger.has("2024_01_01_000000_create_x").unwrap());
    }

    #[test]
    fn invalid_table_name_rejected() {
        let err = SqliteLedger::open(Connection::open_in_memory().unwrap(), "x; DROP TABLE y")
            .err()
            .unwrap();
        assert!(matches!(err, ActionsError::InvalidTable(_)));
    }

    #[test]
    fn parse_applied_at_formats() {
        assert!(parse_applied_at("2024-01-01T10:00:00.123Z").is_ok());
        assert!(parse_applied_at("2024-01-01 10:00:00").is_ok());
        assert!(parse_applied_at("yesterday").is_err());
    }
}
