// SQLite-backed gateway: versioned documents and append-only logs.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::{PersistenceGateway, Versioned};
use crate::error::GatewayError;

/// Durable gateway on a single SQLite file.
///
/// Conditional writes are a single `UPDATE ... WHERE version = ?`, so the
/// check and the write are atomic even when several processes share the
/// file. Log uniqueness is a table constraint.
pub struct SqliteGateway {
    conn: Mutex<Connection>,
}

impl SqliteGateway {
    /// Open (or create) a database at `path` and ensure the schema exists.
    /// Pass `":memory:"` for an ephemeral database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                key        TEXT PRIMARY KEY,
                version    INTEGER NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS log_entries (
                seq        INTEGER PRIMARY KEY AUTOINCREMENT,
                log_key    TEXT NOT NULL,
                unique_key TEXT NOT NULL,
                value      TEXT NOT NULL,
                UNIQUE(log_key, unique_key)
            );

            CREATE INDEX IF NOT EXISTS idx_log_entries_log_key ON log_entries(log_key, seq);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, GatewayError> {
        self.conn
            .lock()
            .map_err(|_| GatewayError::Unavailable("database mutex poisoned".into()))
    }

    fn get_sync(&self, key: &str) -> Result<Option<Versioned<Value>>, GatewayError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT version, value FROM documents WHERE key = ?1",
                params![key],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        match row {
            Some((version, text)) => Ok(Some(Versioned {
                version: version as u64,
                value: serde_json::from_str(&text)?,
            })),
            None => Ok(None),
        }
    }

    fn put_sync(
        &self,
        key: &str,
        value: &Value,
        expected_version: Option<u64>,
    ) -> Result<u64, GatewayError> {
        let text = serde_json::to_string(value)?;
        let conn = self.conn()?;

        let (changed, version) = match expected_version {
            None => {
                let n = conn.execute(
                    "INSERT OR IGNORE INTO documents (key, version, value) VALUES (?1, 1, ?2)",
                    params![key, text],
                )?;
                (n, 1)
            }
            Some(expected) => {
                let next = expected + 1;
                let n = conn.execute(
                    "UPDATE documents
                     SET version = ?3, value = ?4,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE key = ?1 AND version = ?2",
                    params![key, expected as i64, next as i64, text],
                )?;
                (n, next)
            }
        };

        if changed == 0 {
            return Err(GatewayError::VersionConflict {
                key: key.to_string(),
                expected: expected_version,
            });
        }
        Ok(version)
    }

    fn append_sync(
        &self,
        log_key: &str,
        unique_key: &str,
        entry: &Value,
    ) -> Result<(), GatewayError> {
        let text = serde_json::to_string(entry)?;
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO log_entries (log_key, unique_key, value) VALUES (?1, ?2, ?3)",
            params![log_key, unique_key, text],
        )?;
        if inserted == 0 {
            return Err(GatewayError::DuplicateKey {
                log_key: log_key.to_string(),
                unique_key: unique_key.to_string(),
            });
        }
        Ok(())
    }

    fn read_log_sync(&self, log_key: &str) -> Result<Vec<Value>, GatewayError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT value FROM log_entries WHERE log_key = ?1 ORDER BY seq")?;
        let rows = stmt.query_map(params![log_key], |row| row.get::<_, String>(0))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(serde_json::from_str(&row?)?);
        }
        Ok(entries)
    }

    fn list_keys_sync(&self, prefix: &str) -> Result<Vec<String>, GatewayError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key FROM documents ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut keys = Vec::new();
        for row in rows {
            let key = row?;
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn get(&self, key: &str) -> Result<Option<Versioned<Value>>, GatewayError> {
        self.get_sync(key)
    }

    async fn put(
        &self,
        key: &str,
        value: Value,
        expected_version: Option<u64>,
    ) -> Result<u64, GatewayError> {
        self.put_sync(key, &value, expected_version)
    }

    async fn append_unique(
        &self,
        log_key: &str,
        unique_key: &str,
        entry: Value,
    ) -> Result<(), GatewayError> {
        self.append_sync(log_key, unique_key, &entry)
    }

    async fn read_log(&self, log_key: &str) -> Result<Vec<Value>, GatewayError> {
        self.read_log_sync(log_key)
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, GatewayError> {
        self.list_keys_sync(prefix)
    }
}
