//! SQLite-backed record sink.
//!
//! One flat table, append-only: every produced or re-sent record becomes a
//! row. Reads order by `(change_time, ingest_time)` — timestamps are stored
//! as fixed-width RFC 3339 text (microseconds, `Z` offset) precisely so that
//! lexicographic ordering in SQL matches chronological ordering.
//!
//! Runtime defaults follow the projection conventions:
//! - `journal_mode = WAL` to allow concurrent readers while writers append
//! - `busy_timeout = 5s` to reduce transient lock failures under contention

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Row, params};
use std::{path::Path, time::Duration};

use caseline_core::case::HandlingMethod;
use caseline_core::ids::{ActivityCode, CaseRef, OrgUnit, Worker};

use crate::record::CaseRecord;
use crate::repo::RecordSink;

/// Busy timeout used for sink connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS case_records (
    row_id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_ref TEXT NOT NULL,
    change_time TEXT NOT NULL,
    ingest_time TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    version TEXT NOT NULL,
    resend INTEGER NOT NULL CHECK (resend IN (0, 1)),
    status TEXT NOT NULL,
    outcome TEXT,
    outcome_rationale TEXT,
    owning_unit TEXT,
    assigned_worker TEXT,
    received_time TEXT NOT NULL,
    opened_time TEXT,
    decision_time TEXT,
    completed_time TEXT,
    handling TEXT NOT NULL CHECK (handling IN ('MANUAL', 'AUTOMATIC')),
    activity_code TEXT
);

CREATE INDEX IF NOT EXISTS idx_case_records_series
    ON case_records (case_ref, change_time, ingest_time);
";

/// Durable [`RecordSink`] on a SQLite database.
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Open (or create) the sink database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if opening, configuring, or migrating the database
    /// fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create sink directory {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open sink database {}", path.display()))?;
        Self::bootstrap(conn)
    }

    /// Open an in-memory sink (tests).
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sink")?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "synchronous", "NORMAL")
            .context("configure sqlite pragmas")?;
        let _journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .context("enable WAL")?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)
            .context("set busy timeout")?;
        conn.execute_batch(SCHEMA_SQL).context("create sink schema")?;
        Ok(Self { conn })
    }

    fn insert(&self, record: &CaseRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO case_records (
                    case_ref, change_time, ingest_time, sequence, version, resend,
                    status, outcome, outcome_rationale, owning_unit, assigned_worker,
                    received_time, opened_time, decision_time, completed_time,
                    handling, activity_code
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    record.case_ref.as_str(),
                    encode_time(record.change_time),
                    encode_time(record.ingest_time),
                    record.sequence,
                    record.version,
                    i64::from(record.resend),
                    record.status,
                    record.outcome,
                    record.outcome_rationale,
                    record.owning_unit.as_ref().map(OrgUnit::as_str),
                    record.assigned_worker.as_ref().map(Worker::as_str),
                    encode_time(record.received_time),
                    record.opened_time.map(encode_time),
                    record.decision_time.map(encode_time),
                    record.completed_time.map(encode_time),
                    record.handling.as_str(),
                    record.activity_code.as_ref().map(ActivityCode::as_str),
                ],
            )
            .context("insert record")?;
        Ok(())
    }
}

impl RecordSink for SqliteSink {
    fn latest_for_case(&self, case_ref: &CaseRef) -> Result<Option<CaseRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT * FROM case_records WHERE case_ref = ?1
                 ORDER BY change_time DESC, ingest_time DESC, row_id DESC LIMIT 1",
            )
            .context("prepare latest query")?;
        let mut rows = stmt
            .query_map(params![case_ref.as_str()], row_to_record)
            .context("query latest record")?;
        rows.next().transpose().context("decode latest record")
    }

    fn all_for_case(&self, case_ref: &CaseRef) -> Result<Vec<CaseRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT * FROM case_records WHERE case_ref = ?1
                 ORDER BY change_time ASC, ingest_time ASC, row_id ASC",
            )
            .context("prepare series query")?;
        let rows = stmt
            .query_map(params![case_ref.as_str()], row_to_record)
            .context("query record series")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("decode record series")
    }

    fn append(&self, record: &CaseRecord) -> Result<()> {
        self.insert(record)
    }

    fn append_many(&self, records: &[CaseRecord]) -> Result<()> {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .context("begin append transaction")?;
        for record in records {
            if let Err(err) = self.insert(record) {
                let _ = self.conn.execute_batch("ROLLBACK");
                return Err(err);
            }
        }
        self.conn
            .execute_batch("COMMIT")
            .context("commit append transaction")
    }
}

fn encode_time(time: DateTime<Utc>) -> String {
    // Fixed width and always-Z so lexicographic order is chronological.
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        })
}

fn decode_opt_time(raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(decode_time).transpose()
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<CaseRecord> {
    let change_time: String = row.get("change_time")?;
    let ingest_time: String = row.get("ingest_time")?;
    let received_time: String = row.get("received_time")?;
    let opened_time: Option<String> = row.get("opened_time")?;
    let decision_time: Option<String> = row.get("decision_time")?;
    let completed_time: Option<String> = row.get("completed_time")?;
    let handling: String = row.get("handling")?;

    Ok(CaseRecord {
        case_ref: CaseRef::new(row.get::<_, String>("case_ref")?),
        change_time: decode_time(&change_time)?,
        ingest_time: decode_time(&ingest_time)?,
        sequence: row.get("sequence")?,
        version: row.get("version")?,
        resend: row.get::<_, i64>("resend")? != 0,
        status: row.get("status")?,
        outcome: row.get("outcome")?,
        outcome_rationale: row.get("outcome_rationale")?,
        owning_unit: row.get::<_, Option<String>>("owning_unit")?.map(OrgUnit::new),
        assigned_worker: row
            .get::<_, Option<String>>("assigned_worker")?
            .map(Worker::new),
        received_time: decode_time(&received_time)?,
        opened_time: decode_opt_time(opened_time)?,
        decision_time: decode_opt_time(decision_time)?,
        completed_time: decode_opt_time(completed_time)?,
        handling: handling.parse::<HandlingMethod>().map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        })?,
        activity_code: row
            .get::<_, Option<String>>("activity_code")?
            .map(ActivityCode::new),
    })
}
