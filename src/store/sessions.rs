//! Typed CRUD over the `sessions` table

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{random_token, RecordStore};
use crate::error::{PanelError, Result};

/// Random bytes behind every session id
pub const SESSION_ID_BYTES: usize = 36;

/// Server-side session bound to a Discord token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer value stored in the client cookie
    pub id: String,
    pub access_token: String,
    pub refresh_token: String,
    /// When the access token stops being valid at Discord
    pub expires: DateTime<Utc>,
}

/// Fields to overwrite on an existing session. `None` leaves the column alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires: Option<DateTime<Utc>>,
}

/// Writable columns of `sessions`. `id` is deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionColumn {
    AccessToken,
    RefreshToken,
    Expires,
}

impl SessionColumn {
    fn name(self) -> &'static str {
        match self {
            SessionColumn::AccessToken => "access_token",
            SessionColumn::RefreshToken => "refresh_token",
            SessionColumn::Expires => "expires",
        }
    }
}

impl SessionPatch {
    /// Patch that rotates the whole token pair, as a refresh does
    pub fn tokens(access_token: String, refresh_token: String, expires: DateTime<Utc>) -> Self {
        Self {
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            expires: Some(expires),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.assignments().is_empty()
    }

    fn assignments(&self) -> Vec<(SessionColumn, Value)> {
        let SessionPatch {
            access_token,
            refresh_token,
            expires,
        } = self;

        let mut sets = Vec::with_capacity(3);
        if let Some(token) = access_token {
            sets.push((SessionColumn::AccessToken, Value::Text(token.clone())));
        }
        if let Some(token) = refresh_token {
            sets.push((SessionColumn::RefreshToken, Value::Text(token.clone())));
        }
        if let Some(expires) = expires {
            sets.push((SessionColumn::Expires, Value::Text(format_timestamp(expires))));
        }
        sets
    }
}

/// Repository over the `sessions` table
#[derive(Clone)]
pub struct SessionRepository {
    store: RecordStore,
}

impl SessionRepository {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Insert a new session under a freshly generated id
    pub fn insert(
        &self,
        access_token: &str,
        refresh_token: &str,
        expires: DateTime<Utc>,
    ) -> Result<Session> {
        let id = generate_session_id();

        self.store.with_conn(|conn| {
            conn.prepare_cached(
                "INSERT INTO sessions (id, access_token, refresh_token, expires)
                 VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![id, access_token, refresh_token, format_timestamp(&expires)])?;
            Ok(())
        })?;

        debug!("Inserted session expiring at {}", expires);

        Ok(Session {
            id,
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expires,
        })
    }

    /// Look up a session by id
    pub fn get(&self, id: &str) -> Result<Option<Session>> {
        let raw = self.store.with_conn(|conn| {
            let raw = conn
                .prepare_cached(
                    "SELECT id, access_token, refresh_token, expires
                     FROM sessions
                     WHERE id = ?1",
                )?
                .query_row([id], RawSession::from_row)
                .optional()?;
            Ok(raw)
        })?;

        raw.map(RawSession::build).transpose()
    }

    /// Overwrite the columns present in `patch`. An empty patch writes nothing.
    pub fn update(&self, id: &str, patch: &SessionPatch) -> Result<()> {
        let assignments = patch.assignments();
        if assignments.is_empty() {
            return Ok(());
        }

        let sets = assignments
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", column.name(), i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE sessions SET {} WHERE id = ?{}",
            sets,
            assignments.len() + 1
        );

        let values = assignments
            .into_iter()
            .map(|(_, value)| value)
            .chain(std::iter::once(Value::Text(id.to_string())));

        let changed = self
            .store
            .with_conn(|conn| Ok(conn.prepare_cached(&sql)?.execute(params_from_iter(values))?))?;

        if changed == 0 {
            debug!("Update matched no session row");
        }
        Ok(())
    }

    /// Delete a session. Deleting a missing id is not an error.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.store.with_conn(|conn| {
            conn.prepare_cached("DELETE FROM sessions WHERE id = ?1")?
                .execute([id])?;
            Ok(())
        })
    }
}

/// Row as stored, before the timestamp is parsed
struct RawSession {
    id: String,
    access_token: String,
    refresh_token: String,
    expires: String,
}

impl RawSession {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            access_token: row.get(1)?,
            refresh_token: row.get(2)?,
            expires: row.get(3)?,
        })
    }

    fn build(self) -> Result<Session> {
        let expires = DateTime::parse_from_rfc3339(&self.expires)
            .map_err(|e| PanelError::CorruptRecord {
                table: "sessions",
                column: "expires",
                message: format!("{:?}: {}", self.expires, e),
            })?
            .with_timezone(&Utc);

        Ok(Session {
            id: self.id,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires,
        })
    }
}

/// ISO-8601 in UTC with a `Z` suffix, keeping sub-second precision
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn generate_session_id() -> String {
    random_token(SESSION_ID_BYTES)
}
