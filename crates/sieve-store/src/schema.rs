use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

/// Prepare a shared-container connection.
///
/// `busy_timeout` must be set before the WAL switch and table creation.
/// Nothing is written when the schema is already current.
pub fn initialize(conn: &Connection, busy_timeout_ms: u64) -> Result<()> {
    conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS defaults (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;

    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    if stored.as_deref() != Some(SCHEMA_VERSION.to_string().as_str()) {
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
            [SCHEMA_VERSION.to_string()],
        )?;
        tracing::info!("shared container schema initialized (v{SCHEMA_VERSION})");
    }

    Ok(())
}
