use std::path::{Path, PathBuf};
use std::{env, fs};

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{Result, StoreError};
use crate::schema;

/// App-group identity shared by the filter process and the host application.
pub const SHARED_GROUP: &str = "group.sieve.shared";

/// Key-value database file inside the container directory.
pub const CONTAINER_DB_FILE: &str = "defaults.sqlite";

/// Environment override for the container directory.
pub const CONTAINER_DIR_ENV: &str = "SIEVE_CONTAINER_DIR";

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// `$HOME/.sieve/group.sieve.shared`
pub fn default_container_dir() -> PathBuf {
    dirs_home().join(".sieve").join(SHARED_GROUP)
}

/// Explicit override > `SIEVE_CONTAINER_DIR` > default.
pub fn resolve_container_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    env::var(CONTAINER_DIR_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(default_container_dir)
}

/// String-keyed storage both processes can open.
///
/// Layout:
/// ```text
/// <container>/
/// ├── defaults.sqlite     key → value (spam log lives under one key)
/// ├── sieve.toml          optional filter configuration
/// └── channels/<name>/    change-notification endpoints
/// ```
pub struct SharedContainer {
    conn: Connection,
    dir: PathBuf,
}

impl SharedContainer {
    /// Open (creating if needed) the container at `dir`.
    pub fn open(dir: &Path, busy_timeout_ms: u64) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            StoreError::InvalidData(format!("failed to create {}: {e}", dir.display()))
        })?;
        let conn = Connection::open(dir.join(CONTAINER_DB_FILE))?;
        schema::initialize(&conn, busy_timeout_ms)?;
        tracing::info!("opened shared container at {}", dir.display());
        Ok(Self {
            conn,
            dir: dir.to_path_buf(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn, 0)?;
        Ok(Self {
            conn,
            dir: PathBuf::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        get_on(&self.conn, key)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        set_on(&self.conn, key, value)
    }
}

pub(crate) fn get_on(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM defaults WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value)
}

pub(crate) fn set_on(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO defaults (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}
