//! Database schema for the capture index

/// SQL schema for the capture index
pub const SCHEMA_SQL: &str = r#"
-- One row per captured task; re-delivery of the same id replaces the row
CREATE TABLE IF NOT EXISTS captures (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    captured_at TEXT NOT NULL,
    annotated INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_captures_captured_at ON captures(captured_at);
"#;

/// Initializes the database schema
///
/// Safe to call on an existing database.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
