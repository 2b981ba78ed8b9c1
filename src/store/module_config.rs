//! Per-guild module configuration records

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, ErrorCode, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::RecordStore;
use crate::error::{PanelError, Result};

/// Stored configuration for one module on one guild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfigRecord {
    pub server_id: String,
    pub module_id: i64,
    pub enabled: bool,
    pub module_config: serde_json::Value,
}

/// The value part of a record, without its key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub enabled: bool,
    pub module_config: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModuleConfigPatch {
    pub enabled: Option<bool>,
    pub module_config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy)]
enum ModuleConfigColumn {
    Enabled,
    ModuleConfig,
}

impl ModuleConfigColumn {
    fn name(self) -> &'static str {
        match self {
            ModuleConfigColumn::Enabled => "enabled",
            ModuleConfigColumn::ModuleConfig => "module_config",
        }
    }
}

impl ModuleConfigPatch {
    fn assignments(&self) -> Result<Vec<(ModuleConfigColumn, Value)>> {
        let ModuleConfigPatch {
            enabled,
            module_config,
        } = self;

        let mut sets = Vec::with_capacity(2);
        if let Some(enabled) = enabled {
            sets.push((ModuleConfigColumn::Enabled, Value::Integer(i64::from(*enabled))));
        }
        if let Some(config) = module_config {
            sets.push((
                ModuleConfigColumn::ModuleConfig,
                Value::Text(serde_json::to_string(config)?),
            ));
        }
        Ok(sets)
    }
}

#[derive(Clone)]
pub struct ModuleConfigRepository {
    store: RecordStore,
}

impl ModuleConfigRepository {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Insert a record. Returns `false` if one already exists for the key.
    pub fn create(&self, record: &ModuleConfigRecord) -> Result<bool> {
        let config = serde_json::to_string(&record.module_config)?;

        let outcome = self.store.with_conn(|conn| {
            let inserted = conn
                .prepare_cached(
                    "INSERT INTO module_config (server_id, module_id, module_config, enabled)
                     VALUES (?1, ?2, ?3, ?4)",
                )?
                .execute(params![
                    record.server_id,
                    record.module_id,
                    config,
                    i64::from(record.enabled)
                ]);
            Ok(inserted)
        })?;

        match outcome {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                debug!(
                    "Module config {}/{} already exists",
                    record.server_id, record.module_id
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get(&self, server_id: &str, module_id: i64) -> Result<Option<ModuleConfigRecord>> {
        let raw = self.store.with_conn(|conn| {
            let raw = conn
                .prepare_cached(
                    "SELECT server_id, module_id, module_config, enabled
                     FROM module_config
                     WHERE server_id = ?1 AND module_id = ?2",
                )?
                .query_row(params![server_id, module_id], RawRecord::from_row)
                .optional()?;
            Ok(raw)
        })?;

        raw.map(RawRecord::build).transpose()
    }

    /// Just the configuration and flag for a key
    pub fn get_config(&self, server_id: &str, module_id: i64) -> Result<Option<ModuleConfig>> {
        Ok(self.get(server_id, module_id)?.map(|record| ModuleConfig {
            enabled: record.enabled,
            module_config: record.module_config,
        }))
    }

    /// All records of a guild, ordered by module id
    pub fn list_for_server(&self, server_id: &str) -> Result<Vec<ModuleConfigRecord>> {
        let raws = self.store.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT server_id, module_id, module_config, enabled
                 FROM module_config
                 WHERE server_id = ?1
                 ORDER BY module_id",
            )?;
            let raws = stmt
                .query_map([server_id], RawRecord::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(raws)
        })?;

        raws.into_iter().map(RawRecord::build).collect()
    }

    /// Apply `patch`. Returns whether a record was changed.
    pub fn update(&self, server_id: &str, module_id: i64, patch: &ModuleConfigPatch) -> Result<bool> {
        let assignments = patch.assignments()?;
        if assignments.is_empty() {
            return Ok(false);
        }

        let sets = assignments
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", column.name(), i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let n = assignments.len();
        let sql = format!(
            "UPDATE module_config SET {} WHERE server_id = ?{} AND module_id = ?{}",
            sets,
            n + 1,
            n + 2
        );

        let values = assignments
            .into_iter()
            .map(|(_, value)| value)
            .chain([Value::Text(server_id.to_string()), Value::Integer(module_id)]);

        let changed = self
            .store
            .with_conn(|conn| Ok(conn.prepare_cached(&sql)?.execute(params_from_iter(values))?))?;
        Ok(changed > 0)
    }

    /// Returns whether a record was removed
    pub fn delete(&self, server_id: &str, module_id: i64) -> Result<bool> {
        let removed = self.store.with_conn(|conn| {
            Ok(conn
                .prepare_cached("DELETE FROM module_config WHERE server_id = ?1 AND module_id = ?2")?
                .execute(params![server_id, module_id])?)
        })?;
        Ok(removed > 0)
    }
}

struct RawRecord {
    server_id: String,
    module_id: i64,
    module_config: String,
    enabled: i64,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            server_id: row.get(0)?,
            module_id: row.get(1)?,
            module_config: row.get(2)?,
            enabled: row.get(3)?,
        })
    }

    fn build(self) -> Result<ModuleConfigRecord> {
        let module_config =
            serde_json::from_str(&self.module_config).map_err(|e| PanelError::CorruptRecord {
                table: "module_config",
                column: "module_config",
                message: e.to_string(),
            })?;

        Ok(ModuleConfigRecord {
            server_id: self.server_id,
            module_id: self.module_id,
            enabled: self.enabled > 0,
            module_config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repo() -> ModuleConfigRepository {
        RecordStore::open_in_memory().unwrap().module_configs()
    }

    fn record(enabled: bool) -> ModuleConfigRecord {
        ModuleConfigRecord {
            server_id: "test".to_string(),
            module_id: 1,
            enabled,
            module_config: json!({ "channel": "welcome", "threshold": 3 }),
        }
    }

    #[test]
    fn test_create_and_get() {
        let repo = repo();
        assert!(repo.create(&record(true)).unwrap());

        let fetched = repo.get("test", 1).unwrap().unwrap();
        assert_eq!(fetched, record(true));

        let config = repo.get_config("test", 1).unwrap().unwrap();
        assert!(config.enabled);
        assert_eq!(config.module_config["channel"], "welcome");
    }

    #[test]
    fn test_duplicate_create_returns_false() {
        let repo = repo();
        assert!(repo.create(&record(true)).unwrap());
        assert!(!repo.create(&record(false)).unwrap());
        assert!(repo.get("test", 1).unwrap().unwrap().enabled);
    }

    #[test]
    fn test_update_enabled_only() {
        let repo = repo();
        repo.create(&record(true)).unwrap();

        let changed = repo
            .update(
                "test",
                1,
                &ModuleConfigPatch {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(changed);

        let fetched = repo.get("test", 1).unwrap().unwrap();
        assert!(!fetched.enabled);
        assert_eq!(fetched.module_config, record(true).module_config);
    }

    #[test]
    fn test_update_missing_or_empty() {
        let repo = repo();
        assert!(!repo
            .update(
                "test",
                9,
                &ModuleConfigPatch {
                    module_config: Some(json!({})),
                    ..Default::default()
                }
            )
            .unwrap());

        repo.create(&record(true)).unwrap();
        assert!(!repo.update("test", 1, &ModuleConfigPatch::default()).unwrap());
    }

    #[test]
    fn test_delete() {
        let repo = repo();
        repo.create(&record(true)).unwrap();

        assert!(repo.delete("test", 1).unwrap());
        assert!(!repo.delete("test", 1).unwrap());
        assert!(repo.get("test", 1).unwrap().is_none());
    }

    #[test]
    fn test_list_for_server() {
        let repo = repo();
        for module_id in [3, 1, 2] {
            repo.create(&ModuleConfigRecord {
                module_id,
                ..record(true)
            })
            .unwrap();
        }
        repo.create(&ModuleConfigRecord {
            server_id: "other".to_string(),
            ..record(true)
        })
        .unwrap();

        let ids: Vec<i64> = repo
            .list_for_server("test")
            .unwrap()
            .into_iter()
            .map(|r| r.module_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
