//! SQLite schema and connection pragmas for member role storage.

use rusqlite::Connection;

/// Insert a role for a member. Re-adding an existing role is a no-op.
pub const INSERT_ROLE_SQL: &str =
    "INSERT OR IGNORE INTO member_roles (member_id, guild_id, role_id) VALUES (?1, ?2, ?3)";

/// Remove one role from a member.
pub const REMOVE_ROLE_SQL: &str =
    "DELETE FROM member_roles WHERE member_id = ?1 AND guild_id = ?2 AND role_id = ?3";

/// All roles held by a member in a guild.
pub const SELECT_MEMBER_ROLES_SQL: &str =
    "SELECT role_id FROM member_roles WHERE member_id = ?1 AND guild_id = ?2 ORDER BY role_id ASC";

pub const REMOVE_ALL_MEMBER_ROLES_SQL: &str =
    "DELETE FROM member_roles WHERE member_id = ?1 AND guild_id = ?2";

pub const REMOVE_GUILD_SQL: &str = "DELETE FROM member_roles WHERE guild_id = ?1";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS member_roles (
    member_id INTEGER NOT NULL,
    guild_id  INTEGER NOT NULL,
    role_id   INTEGER NOT NULL,
    PRIMARY KEY (member_id, guild_id, role_id)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_member_roles_guild ON member_roles (guild_id);
"#;

/// Apply pragmas for connections that write.
pub fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        "#,
    )
}

/// Apply pragmas for pooled read-only connections.
pub fn apply_reader_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA busy_timeout = 5000;
        PRAGMA query_only = ON;
        "#,
    )
}

/// Create tables and indexes if they do not exist.
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

/// Store a snowflake id in an SQLite INTEGER column.
///
/// SQLite integers are signed 64-bit; the bits are kept as-is so ids above `i64::MAX`
/// survive the round trip.
pub fn to_sql_id(id: u64) -> i64 {
    id as i64
}

/// Inverse of [`to_sql_id`].
pub fn from_sql_id(id: i64) -> u64 {
    id as u64
}
