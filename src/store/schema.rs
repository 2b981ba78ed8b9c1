use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;

/// Current schema version, recorded in `PRAGMA user_version`
pub const SCHEMA_VERSION: i64 = 2;

const CREATE_SESSIONS: &str = "CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY NOT NULL,
    access_token TEXT NOT NULL,
    refresh_token TEXT NOT NULL,
    expires TEXT NOT NULL
)";

const CREATE_MODULE_CONFIG: &str = "CREATE TABLE IF NOT EXISTS module_config (
    server_id TEXT NOT NULL,
    module_id INTEGER NOT NULL,
    module_config TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (server_id, module_id)
)";

/// Only a SHA-256 digest of each bot token is kept
const CREATE_API_TOKENS: &str = "CREATE TABLE IF NOT EXISTS api_tokens (
    token_hash TEXT PRIMARY KEY NOT NULL,
    label TEXT NOT NULL,
    created TEXT NOT NULL
)";

const CREATE_LOGS: &str = "CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    server_id TEXT NOT NULL,
    command TEXT NOT NULL,
    command_id INTEGER NOT NULL,
    date_created TEXT NOT NULL
)";

const CREATE_LOGS_SERVER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS logs_server_id ON logs (server_id, date_created)";

/// Create every table if missing. Safe to run on an existing database.
pub fn init(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    conn.execute(CREATE_SESSIONS, [])?;
    conn.execute(CREATE_MODULE_CONFIG, [])?;
    conn.execute(CREATE_API_TOKENS, [])?;
    conn.execute(CREATE_LOGS, [])?;
    conn.execute(CREATE_LOGS_SERVER_INDEX, [])?;

    if version < SCHEMA_VERSION {
        debug!("Migrating schema from version {} to {}", version, SCHEMA_VERSION);
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        init(&conn).unwrap();

        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_module_config_enabled_defaults_to_one() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();

        conn.execute(
            "INSERT INTO module_config (server_id, module_id, module_config) VALUES ('42', 1, '{}')",
            [],
        )
        .unwrap();
        let enabled: i64 = conn
            .query_row("SELECT enabled FROM module_config WHERE server_id = '42'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
