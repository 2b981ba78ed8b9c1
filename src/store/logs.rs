//! Command logs reported by the bot

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::sessions::format_timestamp;
use super::RecordStore;
use crate::error::{PanelError, Result};

/// One command invocation as seen by the bot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message_id: String,
    pub user_id: String,
    pub server_id: String,
    pub command: String,
    pub command_id: i64,
    pub date_created: DateTime<Utc>,
}

#[derive(Clone)]
pub struct LogRepository {
    store: RecordStore,
}

impl LogRepository {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Append an entry and return its row id
    pub fn create(&self, entry: &LogEntry) -> Result<i64> {
        let id = self.store.with_conn(|conn| {
            conn.prepare_cached(
                "INSERT INTO logs (message_id, user_id, server_id, command, command_id, date_created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?
            .execute(params![
                entry.message_id,
                entry.user_id,
                entry.server_id,
                entry.command,
                entry.command_id,
                format_timestamp(&entry.date_created)
            ])?;
            Ok(conn.last_insert_rowid())
        })?;

        debug!(
            "Logged command {} on guild {} as #{}",
            entry.command, entry.server_id, id
        );
        Ok(id)
    }

    /// Entries of one guild, oldest first
    pub fn list_for_server(&self, server_id: &str) -> Result<Vec<LogEntry>> {
        let raws = self.store.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT message_id, user_id, server_id, command, command_id, date_created
                 FROM logs
                 WHERE server_id = ?1
                 ORDER BY date_created, id",
            )?;
            let raws = stmt
                .query_map([server_id], RawLog::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(raws)
        })?;

        raws.into_iter().map(RawLog::build).collect()
    }
}

struct RawLog {
    message_id: String,
    user_id: String,
    server_id: String,
    command: String,
    command_id: i64,
    date_created: String,
}

impl RawLog {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            message_id: row.get(0)?,
            user_id: row.get(1)?,
            server_id: row.get(2)?,
            command: row.get(3)?,
            command_id: row.get(4)?,
            date_created: row.get(5)?,
        })
    }

    fn build(self) -> Result<LogEntry> {
        let date_created = DateTime::parse_from_rfc3339(&self.date_created)
            .map_err(|e| PanelError::CorruptRecord {
                table: "logs",
                column: "date_created",
                message: format!("{:?}: {}", self.date_created, e),
            })?
            .with_timezone(&Utc);

        Ok(LogEntry {
            message_id: self.message_id,
            user_id: self.user_id,
            server_id: self.server_id,
            command: self.command,
            command_id: self.command_id,
            date_created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(server_id: &str, command: &str, date_created: DateTime<Utc>) -> LogEntry {
        LogEntry {
            message_id: "1100".to_string(),
            user_id: "2200".to_string(),
            server_id: server_id.to_string(),
            command: command.to_string(),
            command_id: 3,
            date_created,
        }
    }

    #[test]
    fn test_create_and_list() {
        let repo = RecordStore::open_in_memory().unwrap().logs();
        let now = Utc::now();

        let later = repo.create(&entry("42", "ban", now)).unwrap();
        let earlier = repo
            .create(&entry("42", "kick", now - Duration::minutes(5)))
            .unwrap();
        repo.create(&entry("7", "ping", now)).unwrap();
        assert_ne!(later, earlier);

        let logs = repo.list_for_server("42").unwrap();
        let commands: Vec<&str> = logs.iter().map(|l| l.command.as_str()).collect();
        assert_eq!(commands, vec!["kick", "ban"]);
        assert_eq!(logs[1], entry("42", "ban", now));
    }

    #[test]
    fn test_corrupt_date_is_reported() {
        let store = RecordStore::open_in_memory().unwrap();
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO logs (message_id, user_id, server_id, command, command_id, date_created)
                     VALUES ('1', '2', '42', 'ban', 1, 'yesterday')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        assert!(matches!(
            store.logs().list_for_server("42"),
            Err(PanelError::CorruptRecord { table: "logs", .. })
        ));
    }
}
