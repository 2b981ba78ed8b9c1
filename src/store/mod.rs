//! Embedded SQLite record store
//!
//! A single connection guarded by a mutex. Every statement runs synchronously
//! and atomically on its own; there are no multi-statement transactions.

pub mod api_tokens;
pub mod logs;
pub mod module_config;
pub mod schema;
pub mod sessions;

use base64::Engine;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{PanelError, Result};

pub use api_tokens::ApiTokenRepository;
pub use logs::{LogEntry, LogRepository};
pub use module_config::{ModuleConfig, ModuleConfigPatch, ModuleConfigRecord, ModuleConfigRepository};
pub use sessions::{Session, SessionPatch, SessionRepository};

/// Handle to the embedded database, cheap to clone
#[derive(Clone)]
pub struct RecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl RecordStore {
    /// Open (or create) the database file and make sure the schema exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| PanelError::Internal {
                    message: format!("Failed to create {}: {}", parent.display(), e),
                })?;
            }
        }

        let conn = Connection::open(path)?;
        info!("Opened record store at {}", path.display());
        Self::from_connection(conn)
    }

    /// Private in-memory database, used by tests and throwaway runs
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        schema::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection while holding the lock
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn sessions(&self) -> SessionRepository {
        SessionRepository::new(self.clone())
    }

    pub fn module_configs(&self) -> ModuleConfigRepository {
        ModuleConfigRepository::new(self.clone())
    }

    pub fn api_tokens(&self) -> ApiTokenRepository {
        ApiTokenRepository::new(self.clone())
    }

    pub fn logs(&self) -> LogRepository {
        LogRepository::new(self.clone())
    }

    /// Close the underlying connection.
    ///
    /// Fails with `Internal` if other handles to the store are still alive.
    pub fn close(self) -> Result<()> {
        let mutex = Arc::try_unwrap(self.conn).map_err(|_| PanelError::Internal {
            message: "record store is still in use".to_string(),
        })?;
        mutex
            .into_inner()
            .close()
            .map_err(|(_, e)| PanelError::from(e))?;
        debug!("Record store closed");
        Ok(())
    }
}

/// `len` bytes from the OS RNG, as URL-safe base64 without padding
pub(crate) fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_open_creates_file_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("panel.db");

        let store = RecordStore::open(&path).unwrap();
        assert!(path.exists());

        let tables: Vec<String> = store
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master
                     WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                     ORDER BY name",
                )?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .unwrap();
        assert_eq!(tables, vec!["api_tokens", "logs", "module_config", "sessions"]);
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panel.db");

        let id = {
            let store = RecordStore::open(&path).unwrap();
            let session = store
                .sessions()
                .insert("access", "refresh", Utc::now())
                .unwrap();
            store.close().unwrap();
            session.id
        };

        let store = RecordStore::open(&path).unwrap();
        assert!(store.sessions().get(&id).unwrap().is_some());
    }

    #[test]
    fn test_close_refuses_while_shared() {
        let store = RecordStore::open_in_memory().unwrap();
        let _repo = store.sessions();
        assert!(matches!(store.close(), Err(PanelError::Internal { .. })));
    }
}
