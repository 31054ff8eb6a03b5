//! SQLite implementation of the batch sink.
//!
//! Each bulk operation runs in one transaction, so a failed batch leaves the table
//! untouched.

use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::schema::{apply_pragmas, to_sql_id};
use crate::batch::RoleRow;
use crate::sink::{BatchOp, SinkConnection, SinkConnector, SinkError};

impl From<rusqlite::Error> for SinkError {
    fn from(error: rusqlite::Error) -> Self {
        SinkError::backend(error)
    }
}

/// Opens write connections to a role database file.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    db_path: PathBuf,
}

impl SqliteConnector {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl SinkConnector for SqliteConnector {
    type Connection = SqliteConnection;

    fn connect(&self) -> Result<Self::Connection, SinkError> {
        let conn = Connection::open(&self.db_path)?;
        apply_pragmas(&conn)?;
        tracing::debug!(path = %self.db_path.display(), "Opened sink connection");
        Ok(SqliteConnection {
            conn,
            statements: HashMap::with_capacity(2),
        })
    }
}

/// Write connection owned by the batch worker.
pub struct SqliteConnection {
    conn: Connection,
    statements: HashMap<BatchOp, String>,
}

impl SinkConnection for SqliteConnection {
    fn prepare(&mut self, op: BatchOp, template: &str) -> Result<(), SinkError> {
        // Compile now so a bad template or missing table fails start-up; later passes hit
        // the statement cache.
        self.conn.prepare_cached(template)?;
        self.statements.insert(op, template.to_string());
        Ok(())
    }

    fn execute_batch(&mut self, op: BatchOp, rows: &[RoleRow]) -> Result<usize, SinkError> {
        let sql = self.statements.get(&op).ok_or(SinkError::NotPrepared(op))?;

        let tx = self.conn.transaction()?;
        let mut affected = 0;
        {
            let mut stmt = tx.prepare_cached(sql)?;
            for row in rows {
                affected += stmt.execute(params![
                    to_sql_id(row.subject),
                    to_sql_id(row.group),
                    to_sql_id(row.attribute)
                ])?;
            }
        }
        tx.commit()?;
        Ok(affected)
    }

    fn close(self) -> Result<(), SinkError> {
        self.conn.close().map_err(|(_, e)| SinkError::backend(e))
    }
}
