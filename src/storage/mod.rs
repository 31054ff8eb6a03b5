//! SQLite storage layer for member roles.
//!
//! Provides:
//! - Schema initialization and pragmas
//! - The SQLite batch sink driven by the drain worker
//! - Read connection pool for role lookups
//! - The `RoleStore` façade that hands out batch workers

pub mod reader;
pub mod schema;
pub mod sink;
pub mod store;

pub use sink::{SqliteConnection, SqliteConnector};
pub use store::{RoleStore, StoreError, DEFAULT_BATCH_THRESHOLD};
