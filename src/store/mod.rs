//! Key-value storage backing the whitelist.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Error;

/// Durable key-value storage with per-key TTL.
///
/// Every operation may fail with `StoreErrorKind::Unavailable`. Timeouts and retries are
/// the implementation's concern; callers in this crate never retry. Operations touch
/// a single key, so per-key atomicity of the backend is all that is required.
#[async_trait]
pub trait Store: Send + Sync {
    /// Store a value that the backend drops once `ttl_minutes` have elapsed.
    async fn put(&self, key: &str, value: Value, ttl_minutes: i64) -> Result<(), Error>;

    /// Store a value with no expiry.
    async fn put_forever(&self, key: &str, value: Value) -> Result<(), Error>;

    /// Fetch a live value. Values whose TTL has elapsed are absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, Error>;

    /// Delete a value, returning whether one was present.
    async fn delete(&self, key: &str) -> Result<bool, Error>;

    /// Remove every value.
    async fn flush(&self) -> Result<(), Error>;
}
