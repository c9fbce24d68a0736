//! SQLite database store implementation.
//!
//! Plays two roles for the core engine: the target directory (which
//! endpoints are monitored) and the record store (append-only probe
//! results, queried by time range).

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::models::*;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Not found")]
    NotFound,
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;

        Ok(())
    }

    // --- Target directory ---

    /// Add a new target and return its ID.
    pub fn add_target(&self, target: &mut Target) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO targets (name, url, display_order, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                target.name,
                target.url,
                target.display_order,
                target.created_at.format(TIME_FORMAT).to_string(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        target.id = id;
        Ok(id)
    }

    /// Get all targets, ordered by display order then creation time.
    pub fn get_targets(&self) -> Result<Vec<Target>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, url, display_order, created_at FROM targets
             ORDER BY display_order ASC, created_at DESC",
        )?;

        let targets = stmt
            .query_map([], |row| {
                let created_str: String = row.get(4)?;
                Ok(Target {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    url: row.get(2)?,
                    display_order: row.get(3)?,
                    created_at: parse_db_time(&created_str).unwrap_or_else(Utc::now),
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(targets)
    }

    /// Get a target by ID.
    pub fn get_target(&self, id: i64) -> Result<Target, DbError> {
        let conn = self.conn.lock().unwrap();
        let target = conn
            .query_row(
                "SELECT id, name, url, display_order, created_at FROM targets WHERE id = ?1",
                params![id],
                |row| {
                    let created_str: String = row.get(4)?;
                    Ok(Target {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        url: row.get(2)?,
                        display_order: row.get(3)?,
                        created_at: parse_db_time(&created_str).unwrap_or_else(Utc::now),
                    })
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => DbError::NotFound,
                other => DbError::Sqlite(other),
            })?;
        Ok(target)
    }

    /// Delete a target and its check records.
    pub fn delete_target(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM check_records WHERE target_id = ?1", params![id])?;
        conn.execute("DELETE FROM targets WHERE id = ?1", params![id])?;
        Ok(())
    }

    // --- Record store ---

    /// Append check records in one transaction.
    ///
    /// All records commit together or not at all; a batch is never
    /// partially written.
    pub fn append_records(&self, records: &[CheckRecord]) -> Result<(), DbError> {
        if records.is_empty() {
            return Ok(());
        }

        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO check_records (target_id, status, response_time_ms, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;

            for r in records {
                stmt.execute(params![
                    r.target_id,
                    r.status.as_str(),
                    r.response_time_ms,
                    r.timestamp.format(TIME_FORMAT).to_string(),
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Get check records for a target within a time range, ordered by timestamp.
    pub fn query_range(
        &self,
        target_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CheckRecord>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT target_id, status, response_time_ms, timestamp FROM check_records
             WHERE target_id = ?1 AND timestamp >= ?2 AND timestamp < ?3
             ORDER BY timestamp ASC",
        )?;

        let records = stmt
            .query_map(
                params![
                    target_id,
                    start.format(TIME_FORMAT).to_string(),
                    end.format(TIME_FORMAT).to_string(),
                ],
                row_to_record,
            )?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(records)
    }

    /// Get check records for several targets within a time range in one
    /// query, ordered by timestamp.
    pub fn query_range_many(
        &self,
        target_ids: &[i64],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CheckRecord>, DbError> {
        if target_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: Vec<String> = (1..=target_ids.len())
            .map(|i| format!("?{}", i))
            .collect();
        let sql = format!(
            "SELECT target_id, status, response_time_ms, timestamp FROM check_records
             WHERE target_id IN ({}) AND timestamp >= ?{} AND timestamp < ?{}
             ORDER BY timestamp ASC",
            placeholders.join(", "),
            target_ids.len() + 1,
            target_ids.len() + 2,
        );

        let mut values: Vec<String> = target_ids.iter().map(|id| id.to_string()).collect();
        values.push(start.format(TIME_FORMAT).to_string());
        values.push(end.format(TIME_FORMAT).to_string());

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;

        let records = stmt
            .query_map(params_from_iter(values.iter()), row_to_record)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(records)
    }

    /// Get the most recent check record for a target, if any.
    pub fn latest_record(&self, target_id: i64) -> Result<Option<CheckRecord>, DbError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT target_id, status, response_time_ms, timestamp FROM check_records
             WHERE target_id = ?1 ORDER BY timestamp DESC LIMIT 1",
            params![target_id],
            row_to_record,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DbError::Sqlite(e)),
        }
    }

    /// Delete check records older than a cutoff. Returns the number deleted.
    pub fn delete_records_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM check_records WHERE timestamp < ?1",
            params![cutoff.format(TIME_FORMAT).to_string()],
        )?;
        Ok(deleted)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> SqlResult<CheckRecord> {
    let status_str: String = row.get(1)?;
    let time_str: String = row.get(3)?;
    Ok(CheckRecord {
        target_id: row.get(0)?,
        status: CheckStatus::from_str(&status_str),
        response_time_ms: row.get(2)?,
        timestamp: parse_db_time(&time_str).unwrap_or_else(Utc::now),
    })
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [
        "%Y-%m-%d %H:%M:%S%.9f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}
