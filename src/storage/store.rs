//! Member role store: immediate reads and writes plus batch workers for bulk scans.

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use super::reader::{ReaderError, ReaderPool};
use super::schema::{
    apply_pragmas, initialize_schema, to_sql_id, INSERT_ROLE_SQL, REMOVE_ALL_MEMBER_ROLES_SQL,
    REMOVE_GUILD_SQL, REMOVE_ROLE_SQL,
};
use super::sink::SqliteConnector;
use crate::batch::{BatchData, BatchError, BatchHandle};

/// Default drain threshold for batch workers.
pub const DEFAULT_BATCH_THRESHOLD: usize = 1000;

/// Error type for role store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Reader error: {0}")]
    Reader(#[from] ReaderError),

    #[error("Batch worker error: {0}")]
    Batch(#[from] BatchError),
}

/// Role storage backed by one SQLite file.
///
/// Live role changes go through the immediate methods; full guild scans should use a
/// [`batch_worker`](Self::batch_worker) so thousands of rows land in a handful of
/// transactions.
pub struct RoleStore {
    db_path: PathBuf,
    writer: Mutex<Connection>,
    readers: ReaderPool,
    batch_threshold: usize,
}

impl RoleStore {
    /// Open (creating if needed) the role database at `db_path`.
    pub fn open<P: AsRef<Path>>(
        db_path: P,
        reader_pool_size: u32,
        batch_threshold: usize,
    ) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref().to_path_buf();
        if batch_threshold == 0 {
            return Err(BatchError::InvalidThreshold.into());
        }

        let writer = Connection::open(&db_path)?;
        apply_pragmas(&writer)?;
        initialize_schema(&writer)?;

        let readers = ReaderPool::new(&db_path, reader_pool_size)?;

        tracing::info!(path = %db_path.display(), batch_threshold, "Role store opened");
        Ok(Self {
            db_path,
            writer: Mutex::new(writer),
            readers,
            batch_threshold,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn batch_threshold(&self) -> usize {
        self.batch_threshold
    }

    /// Roles stored for a member, ascending.
    pub fn member_roles(&self, member: u64, guild: u64) -> Result<Vec<u64>, StoreError> {
        Ok(self.readers.member_roles(member, guild)?)
    }

    /// Number of stored (member, guild, role) rows.
    pub fn role_count(&self) -> Result<u64, StoreError> {
        Ok(self.readers.role_count()?)
    }

    /// Store roles for a member in one transaction.
    pub fn add_member_roles(&self, member: u64, guild: u64, roles: &[u64]) -> Result<usize, StoreError> {
        tracing::debug!(member, guild, ?roles, "Adding roles");
        self.write_roles(INSERT_ROLE_SQL, member, guild, roles)
    }

    /// Remove roles from a member in one transaction.
    pub fn remove_member_roles(
        &self,
        member: u64,
        guild: u64,
        roles: &[u64],
    ) -> Result<usize, StoreError> {
        tracing::debug!(member, guild, ?roles, "Removing roles");
        self.write_roles(REMOVE_ROLE_SQL, member, guild, roles)
    }

    fn write_roles(
        &self,
        sql: &str,
        member: u64,
        guild: u64,
        roles: &[u64],
    ) -> Result<usize, StoreError> {
        let mut conn = self.writer();
        let tx = conn.transaction()?;
        let mut affected = 0;
        {
            let mut stmt = tx.prepare_cached(sql)?;
            for &role in roles {
                affected += stmt.execute(params![
                    to_sql_id(member),
                    to_sql_id(guild),
                    to_sql_id(role)
                ])?;
            }
        }
        tx.commit()?;
        Ok(affected)
    }

    /// Remove every role stored for a member.
    pub fn remove_all_member_roles(&self, member: u64, guild: u64) -> Result<usize, StoreError> {
        let removed = self
            .writer()
            .execute(REMOVE_ALL_MEMBER_ROLES_SQL, params![to_sql_id(member), to_sql_id(guild)])?;
        tracing::debug!(member, guild, removed, "Removed all member roles");
        Ok(removed)
    }

    /// Remove every row belonging to a guild.
    pub fn remove_guild(&self, guild: u64) -> Result<usize, StoreError> {
        let removed = self
            .writer()
            .execute(REMOVE_GUILD_SQL, params![to_sql_id(guild)])?;
        tracing::info!(guild, removed, "Removed guild");
        Ok(removed)
    }

    /// Start a batch worker writing to this database with the store's threshold.
    pub fn batch_worker(&self) -> Result<BatchHandle<SqliteConnector>, StoreError> {
        let worker = BatchHandle::new(self.batch_data()?);
        worker.start()?;
        Ok(worker)
    }

    /// The unstarted bundle behind [`batch_worker`](Self::batch_worker).
    pub fn batch_data(&self) -> Result<BatchData<SqliteConnector>, StoreError> {
        Ok(BatchData::new(
            SqliteConnector::new(&self.db_path),
            || INSERT_ROLE_SQL.to_string(),
            || REMOVE_ROLE_SQL.to_string(),
            self.batch_threshold,
        )?)
    }

    fn writer(&self) -> MutexGuard<'_, Connection> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
