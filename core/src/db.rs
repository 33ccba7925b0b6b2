use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::models::{ActivityEntry, ActivityType, SyncData, default_activity_types};

pub const KEY_BABY_NAME: &str = "baby_name";
pub const KEY_ACTIVITY_TYPES: &str = "activity_types";
pub const KEY_ENTRIES: &str = "entries";
pub const KEY_LAST_SYNC: &str = "last_sync";
pub const KEY_SYNC_KEY: &str = "sync_key";

/// SQLite-backed key/value store. Every value is a JSON document.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS kv_store (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            // Snapshots held on behalf of other devices when running `serve`.
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS remote_snapshots (
                    key TEXT PRIMARY KEY NOT NULL,
                    body TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 2;",
            )?;
        }

        Ok(())
    }

    #[must_use]
    pub fn schema_version(&self) -> i64 {
        self.conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0)
    }

    // --- Raw key/value ---

    pub fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO kv_store (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        debug!(key, bytes = value.len(), "stored value");
        Ok(())
    }

    pub fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM kv_store WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)
            .with_context(|| format!("Failed to serialize value for '{key}'"))?;
        self.set_raw(key, &json)
    }

    /// Read a JSON value. A value that no longer parses is reported and
    /// treated as absent so callers fall back to their defaults.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.get_raw(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, error = %e, "ignoring unreadable stored value");
                Ok(None)
            }
        }
    }

    // --- Typed accessors ---

    pub fn load_baby_name(&self) -> Result<String> {
        Ok(self.get_json(KEY_BABY_NAME)?.unwrap_or_default())
    }

    pub fn save_baby_name(&self, name: &str) -> Result<()> {
        self.set_json(KEY_BABY_NAME, name)
    }

    pub fn load_types(&self) -> Result<Vec<ActivityType>> {
        Ok(self
            .get_json(KEY_ACTIVITY_TYPES)?
            .unwrap_or_else(default_activity_types))
    }

    pub fn save_types(&self, types: &[ActivityType]) -> Result<()> {
        self.set_json(KEY_ACTIVITY_TYPES, types)
    }

    pub fn load_entries(&self) -> Result<Vec<ActivityEntry>> {
        Ok(self.get_json(KEY_ENTRIES)?.unwrap_or_default())
    }

    pub fn save_entries(&self, entries: &[ActivityEntry]) -> Result<()> {
        self.set_json(KEY_ENTRIES, entries)
    }

    /// Epoch millis of the last sync, stored as a decimal string.
    pub fn load_last_sync(&self) -> Result<Option<i64>> {
        let value: Option<String> = self.get_json(KEY_LAST_SYNC)?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    pub fn save_last_sync(&self, millis: i64) -> Result<()> {
        self.set_json(KEY_LAST_SYNC, &millis.to_string())
    }

    pub fn load_sync_key(&self) -> Result<Option<String>> {
        let key: Option<String> = self.get_json(KEY_SYNC_KEY)?;
        Ok(key.filter(|k| !k.trim().is_empty()))
    }

    pub fn save_sync_key(&self, key: &str) -> Result<()> {
        self.set_json(KEY_SYNC_KEY, key)
    }

    // --- Hosted snapshots ---

    pub fn put_remote_snapshot(&self, key: &str, data: &SyncData) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let body = serde_json::to_string(data).context("Failed to serialize snapshot")?;
        self.conn.execute(
            "INSERT INTO remote_snapshots (key, body, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![key, body, now],
        )?;
        Ok(())
    }

    pub fn get_remote_snapshot(&self, key: &str) -> Result<Option<SyncData>> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM remote_snapshots WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            let body: String = row.get(0)?;
            let data = serde_json::from_str(&body)
                .with_context(|| format!("Stored snapshot for '{key}' is corrupt"))?;
            Ok(Some(data))
        } else {
            Ok(None)
        }
    }
}
