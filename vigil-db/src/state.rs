//! Repository for durable key-value state
//!
//! Each key holds one opaque text value. Writers replace the whole value; there
//! is no partial update.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::{Error, Result};

/// A stored key-value entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEntry {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Repository for key-value state records
#[derive(Debug, Clone)]
pub struct StateRepository {
    pool: SqlitePool,
}

impl StateRepository {
    /// Create a new repository instance
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Read the value stored under `key`
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_entry(key).await?.map(|entry| entry.value))
    }

    /// Read the full entry stored under `key`
    pub async fn get_entry(&self, key: &str) -> Result<Option<StateEntry>> {
        let row = sqlx::query("SELECT key, value, updated_at FROM kv_state WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<StateEntry> {
            let updated_at: String = row.try_get("updated_at")?;
            Ok(StateEntry {
                key: row.try_get("key")?,
                value: row.try_get("value")?,
                updated_at: DateTime::parse_from_rfc3339(&updated_at)
                    .map_err(|e| Error::InvalidData(format!("bad timestamp for {}: {}", key, e)))?
                    .with_timezone(&Utc),
            })
        })
        .transpose()
    }

    /// Insert or replace the value stored under `key`
    pub async fn put(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete the entry stored under `key`
    ///
    /// Returns true if an entry was removed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_state WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List all stored keys in ascending order
    pub async fn keys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM kv_state ORDER BY key ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get("key").map_err(Error::from))
            .collect()
    }
}
