//! Bot API tokens
//!
//! Tokens are handed out once in plain text and stored only as a SHA-256
//! digest, so a leaked database does not leak usable credentials.

use base64::Engine;
use chrono::Utc;
use rusqlite::{params, ErrorCode};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::sessions::format_timestamp;
use super::{random_token, RecordStore};
use crate::error::{PanelError, Result};

/// Random bytes behind every API token
pub const API_TOKEN_BYTES: usize = 32;

fn digest(token: &str) -> String {
    let hash = Sha256::digest(token.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hash)
}

#[derive(Clone)]
pub struct ApiTokenRepository {
    store: RecordStore,
}

impl ApiTokenRepository {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Create a token for `label` and return its plain-text value
    pub fn issue(&self, label: &str) -> Result<String> {
        let token = random_token(API_TOKEN_BYTES);
        let created = format_timestamp(&Utc::now());

        self.store.with_conn(|conn| {
            conn.prepare_cached(
                "INSERT INTO api_tokens (token_hash, label, created) VALUES (?1, ?2, ?3)",
            )?
            .execute(params![digest(&token), label, created])
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation => {
                    PanelError::Internal {
                        message: "generated API token collided with an existing one".to_string(),
                    }
                }
                e => e.into(),
            })?;
            Ok(())
        })?;

        info!("Issued API token for {:?}", label);
        Ok(token)
    }

    /// Whether `token` was issued and not revoked
    pub fn exists(&self, token: &str) -> Result<bool> {
        let count: i64 = self.store.with_conn(|conn| {
            Ok(conn
                .prepare_cached("SELECT COUNT(*) FROM api_tokens WHERE token_hash = ?1")?
                .query_row([digest(token)], |row| row.get(0))?)
        })?;
        Ok(count > 0)
    }

    /// Returns whether a token was removed
    pub fn revoke(&self, token: &str) -> Result<bool> {
        let removed = self.store.with_conn(|conn| {
            Ok(conn
                .prepare_cached("DELETE FROM api_tokens WHERE token_hash = ?1")?
                .execute([digest(token)])?)
        })?;
        debug!("Revoked {} API token(s)", removed);
        Ok(removed > 0)
    }
}
