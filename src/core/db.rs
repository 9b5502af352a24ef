use crate::core::error;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

pub const INSTINCT_DB_NAME: &str = "instinct.db";

pub fn db_connect(db_path: &str) -> Result<Connection, error::InstinctError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(error::InstinctError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(error::InstinctError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(error::InstinctError::RusqliteError)?;
    Ok(conn)
}

pub fn instinct_db_path(root: &Path) -> PathBuf {
    root.join(INSTINCT_DB_NAME)
}

// Subsystem schemas live with their owners in `engine::instinct`; this module
// only knows how to open a hardened connection.
