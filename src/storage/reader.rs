//! Read connection pool for role lookups.
//!
//! Uses r2d2 with r2d2_sqlite for pooled read access.
//! SQLite WAL mode lets readers run while the batch worker writes.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use std::path::Path;
use thiserror::Error;

use super::schema::{apply_reader_pragmas, from_sql_id, to_sql_id, SELECT_MEMBER_ROLES_SQL};

/// Error type for reader pool operations.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Failed to create connection pool: {0}")]
    PoolCreation(#[from] r2d2::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Read connection pool for role queries.
#[derive(Clone)]
pub struct ReaderPool {
    pool: Pool<SqliteConnectionManager>,
}

impl ReaderPool {
    /// Create a new reader pool for the given database path.
    ///
    /// The database and its schema must already exist.
    pub fn new<P: AsRef<Path>>(db_path: P, max_size: u32) -> Result<Self, ReaderError> {
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX);

        let pool = Pool::builder()
            .max_size(max_size)
            .connection_customizer(Box::new(ReaderConnectionCustomizer))
            .build(manager)?;

        Ok(Self { pool })
    }

    /// Get a connection from the pool.
    pub fn get(&self) -> Result<PooledConnection<SqliteConnectionManager>, ReaderError> {
        Ok(self.pool.get()?)
    }

    /// Get the current pool state for monitoring.
    pub fn state(&self) -> r2d2::State {
        self.pool.state()
    }

    /// Roles stored for a member in a guild, ascending.
    pub fn member_roles(&self, member: u64, guild: u64) -> Result<Vec<u64>, ReaderError> {
        let conn = self.get()?;
        let mut stmt = conn.prepare_cached(SELECT_MEMBER_ROLES_SQL)?;
        let roles = stmt
            .query_map([to_sql_id(member), to_sql_id(guild)], |row| {
                row.get::<_, i64>(0).map(from_sql_id)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(roles)
    }

    /// Total number of stored (member, guild, role) rows.
    pub fn role_count(&self) -> Result<u64, ReaderError> {
        let conn = self.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM member_roles", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Connection customizer that applies reader pragmas.
#[derive(Debug)]
struct ReaderConnectionCustomizer;

impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error>
    for ReaderConnectionCustomizer
{
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        apply_reader_pragmas(conn)
    }
}
