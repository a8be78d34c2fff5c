//! Durable key-value state
//!
//! The conversation store keeps its whole map under one key and rewrites it on
//! every mutation, so the backing store only needs whole-value reads and writes.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{Error, Result};

/// Typed read/write accessor for durable state
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; absent keys are not an error
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Process-local state, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Storage("state lock poisoned".to_string()))
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(feature = "database")]
#[async_trait]
impl StateStore for vigil_db::Database {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state().get(key).await?)
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        Ok(self.state().put(key, value).await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.state().delete(key).await?;
        Ok(())
    }
}
