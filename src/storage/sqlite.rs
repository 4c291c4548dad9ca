//! SQLite capture index
//!
//! Records which tasks were captured, when, and whether an annotated
//! screenshot was written. The artifact files themselves live next to it.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::StorageResult;
use crate::storage::CaptureRecord;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite-backed index of stored captures
pub struct CaptureIndex {
    conn: Connection,
}

impl CaptureIndex {
    /// Opens or creates the index database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory index (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Inserts the record, replacing any earlier record for the same id
    pub fn upsert(&self, record: &CaptureRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO captures (id, url, captured_at, annotated) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                url = excluded.url,
                captured_at = excluded.captured_at,
                annotated = excluded.annotated",
            params![
                record.id,
                record.url,
                record.captured_at.to_rfc3339(),
                record.annotated
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> StorageResult<Option<CaptureRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, url, captured_at, annotated FROM captures WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, url, captured_at, annotated)) = row else {
            return Ok(None);
        };

        let captured_at = DateTime::parse_from_rfc3339(&captured_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(CaptureRecord {
            id,
            url,
            captured_at,
            annotated,
        }))
    }

    pub fn count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM captures", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
