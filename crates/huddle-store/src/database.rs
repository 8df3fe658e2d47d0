//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/huddle/huddle.db`
    /// - macOS:   `~/Library/Application Support/com.huddle.huddle/huddle.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\huddle\huddle\data\huddle.db`
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "huddle", "huddle").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        Self::open_at(&data_dir.join("huddle.db"))
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Open a private in-memory database. Used by tests and throwaway runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn
            .path()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }
}

// ---------------------------------------------------------------------------
// Column helpers shared by the entity modules
// ---------------------------------------------------------------------------

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
pub(crate) fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn conversion_error<E>(col: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
}

pub(crate) fn ts_from_sql(col: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(col, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");

        let db = Database::open_at(&path).expect("should open");
        assert!(db.path().is_some());
        assert!(path.exists());
    }

    #[test]
    fn reopen_keeps_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        drop(Database::open_at(&path).unwrap());
        let db = Database::open_at(&path).unwrap();
        let version: u32 = db
            .conn()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, migrations::CURRENT_VERSION);
    }

    #[test]
    fn in_memory_has_no_path() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.path().is_none());
    }
}
