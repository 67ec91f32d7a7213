//! SQLite-backed Group Store.
//!
//! A single `kv_store` table maps each top-level key to a JSON value. Uses
//! `rusqlite` in synchronous mode behind a mutex; every group write is a
//! read-modify-write inside one transaction while the lock is held.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::errors::StoreError;
use super::settings::{Settings, SettingsPatch};
use super::{GroupEdit, GroupStore, GROUPS_KEY, LAST_SYNC_KEY, SETTINGS_KEY};
use crate::tabs::CustomGroup;

// ─── Store ──────────────────────────────────────────────────────────────────

/// SQLite handle for groups, settings, and sync state.
pub struct SqliteGroupStore {
    conn: Mutex<Connection>,
}

impl SqliteGroupStore {
    /// Open (or create) the store at the given path.
    ///
    /// Pass `":memory:"` for an in-memory database (tests).
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        // WAL keeps UI reads from blocking behind a long write
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|e| StoreError::LockPoisoned {
            reason: e.to_string(),
        })
    }
}

fn read_value<T: DeserializeOwned>(conn: &Connection, key: &str) -> Result<Option<T>, StoreError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

fn write_value<T: Serialize + ?Sized>(
    conn: &Connection,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let text = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, text],
    )?;
    Ok(())
}

#[async_trait]
impl GroupStore for SqliteGroupStore {
    async fn get_groups(&self) -> Result<Vec<CustomGroup>, StoreError> {
        let conn = self.lock()?;
        Ok(read_value(&conn, GROUPS_KEY)?.unwrap_or_default())
    }

    async fn save_groups(&self, groups: &[CustomGroup]) -> Result<(), StoreError> {
        let conn = self.lock()?;
        write_value(&conn, GROUPS_KEY, groups)?;
        tracing::debug!(count = groups.len(), "saved groups");
        Ok(())
    }

    async fn add_or_update_group(&self, group: &CustomGroup) -> Result<(), StoreError> {
        let group = group.clone();
        let group_id = group.id.clone();
        self.modify_groups(Box::new(move |groups| {
            match groups.iter_mut().find(|g| g.id == group.id) {
                Some(existing) => *existing = group,
                None => groups.push(group),
            }
            true
        }))
        .await?;
        tracing::debug!(group_id = %group_id, "upserted group");
        Ok(())
    }

    async fn remove_group(&self, group_id: &str) -> Result<bool, StoreError> {
        let target = group_id.to_string();
        self.modify_groups(Box::new(move |groups| {
            let before = groups.len();
            groups.retain(|g| g.id != target);
            groups.len() != before
        }))
        .await
    }

    async fn modify_groups(&self, edit: GroupEdit) -> Result<bool, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut groups: Vec<CustomGroup> = read_value(&tx, GROUPS_KEY)?.unwrap_or_default();
        let changed = edit(&mut groups);
        if changed {
            write_value(&tx, GROUPS_KEY, &groups)?;
        }
        tx.commit()?;
        Ok(changed)
    }

    async fn get_settings(&self) -> Result<Settings, StoreError> {
        let conn = self.lock()?;
        Ok(read_value(&conn, SETTINGS_KEY)?.unwrap_or_default())
    }

    async fn update_settings(&self, patch: &SettingsPatch) -> Result<Settings, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let current: Settings = read_value(&tx, SETTINGS_KEY)?.unwrap_or_default();
        let next = current.merged(patch);
        write_value(&tx, SETTINGS_KEY, &next)?;
        tx.commit()?;
        tracing::info!(
            privacy_mode = next.privacy_mode,
            auto_grouping = next.enable_auto_grouping,
            max_history_days = next.max_history_days,
            "settings updated"
        );
        Ok(next)
    }

    async fn last_sync(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.lock()?;
        let raw: Option<String> = read_value(&conn, LAST_SYNC_KEY)?;
        raw.map(|text| {
            DateTime::parse_from_rfc3339(&text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StoreError::SerializationError {
                    reason: format!("invalid last sync timestamp: {e}"),
                })
        })
        .transpose()
    }

    async fn set_last_sync(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.lock()?;
        write_value(&conn, LAST_SYNC_KEY, &at.to_rfc3339())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
