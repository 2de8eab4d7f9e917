//! In-process store with lazy TTL expiry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use super::Store;
use crate::error::Error;

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl Slot {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

/// A [`Store`] kept in process memory.
///
/// Clones share the same underlying map. Expired values are hidden from `get` as soon as
/// their TTL elapses and dropped on the next write to the same key or on
/// [`MemoryStore::purge_expired`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every value whose TTL has elapsed, returning how many were removed.
    ///
    /// Should be called periodically to keep memory bounded.
    pub async fn purge_expired(&self) -> usize {
        let mut slots = self.slots.lock().await;
        let now = Utc::now();
        let before = slots.len();
        slots.retain(|_, slot| slot.is_live(now));
        before - slots.len()
    }

    /// Number of values held, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(&self, key: &str, value: Value, ttl_minutes: i64) -> Result<(), Error> {
        // A TTL beyond chrono's range is kept without expiry
        let expires_at = Duration::try_minutes(ttl_minutes.max(0))
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        let mut slots = self.slots.lock().await;
        slots.insert(key.to_string(), Slot { value, expires_at });
        Ok(())
    }

    async fn put_forever(&self, key: &str, value: Value) -> Result<(), Error> {
        let mut slots = self.slots.lock().await;
        slots.insert(
            key.to_string(),
            Slot {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, Error> {
        let slots = self.slots.lock().await;
        let now = Utc::now();
        Ok(slots
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        let mut slots = self.slots.lock().await;
        let now = Utc::now();
        Ok(slots
            .remove(key)
            .map_or(false, |slot| slot.is_live(now)))
    }

    async fn flush(&self) -> Result<(), Error> {
        self.slots.lock().await.clear();
        Ok(())
    }
}
