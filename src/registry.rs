//! The whitelist: the single source of truth for whether a token may be used or refreshed.
//!
//! Each authorized token has one entry in the backing [`Store`], keyed by the value of the
//! configured key claim (`jti` by default). An entry is either the `"forever"` marker, for
//! tokens without an `exp` claim, or `{"valid_until": <unix seconds>}`.
//!
//! `valid_until` opens a grace window: an entry only comes into force once that moment
//! has passed. The entry's storage TTL is sized separately to outlive both the token's
//! expiry and its refresh window, so a late but legitimate refresh still finds it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use service::config::{Config, DEFAULT_REFRESH_WINDOW_MINUTES, DEFAULT_REGISTRY_KEY_CLAIM};
use tracing::debug;

use crate::claims::{ClaimSet, EXPIRATION};
use crate::error::{claims_error, ClaimsErrorKind, Error, ErrorKind, StoreErrorKind};
use crate::store::Store;

/// Marker stored for entries that never expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marker {
    Forever,
}

/// A whitelist entry as held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entry {
    Forever(Marker),
    Until { valid_until: i64 },
}

impl Entry {
    pub fn forever() -> Self {
        Entry::Forever(Marker::Forever)
    }

    pub fn valid_until(timestamp: i64) -> Self {
        Entry::Until {
            valid_until: timestamp,
        }
    }

    /// Whether the entry authorizes its token at `now`.
    pub fn is_in_force_at(&self, now: i64) -> bool {
        match self {
            Entry::Forever(_) => true,
            Entry::Until { valid_until } => *valid_until <= now,
        }
    }
}

pub struct Whitelist<S: Store> {
    store: S,
    grace_period_seconds: i64,
    refresh_window_minutes: i64,
    key_claim: String,
}

impl<S: Store> Whitelist<S> {
    /// Create a whitelist with no grace period, a two week refresh window, keyed by `jti`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            grace_period_seconds: 0,
            refresh_window_minutes: DEFAULT_REFRESH_WINDOW_MINUTES,
            key_claim: DEFAULT_REGISTRY_KEY_CLAIM.to_string(),
        }
    }

    pub fn from_config(store: S, config: &Config) -> Self {
        Self {
            store,
            grace_period_seconds: config.grace_period_seconds,
            refresh_window_minutes: config.refresh_window_minutes,
            key_claim: config.registry_key_claim.clone(),
        }
    }

    pub fn set_grace_period_seconds(&mut self, grace_period_seconds: i64) -> &mut Self {
        self.grace_period_seconds = grace_period_seconds;
        self
    }

    pub fn set_refresh_window_minutes(&mut self, refresh_window_minutes: i64) -> &mut Self {
        self.refresh_window_minutes = refresh_window_minutes;
        self
    }

    pub fn set_key_claim(&mut self, key_claim: impl Into<String>) -> &mut Self {
        self.key_claim = key_claim.into();
        self
    }

    pub fn grace_period_seconds(&self) -> i64 {
        self.grace_period_seconds
    }

    pub fn refresh_window_minutes(&self) -> i64 {
        self.refresh_window_minutes
    }

    pub fn key_claim(&self) -> &str {
        &self.key_claim
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whitelist a token's claims.
    ///
    /// Claims without `exp` are added forever. Otherwise the entry comes into force after
    /// the grace period and is kept by the store for [`Whitelist::minutes_until_expired`].
    pub async fn add(&self, claims: &ClaimSet) -> Result<bool, Error> {
        if !claims.has(EXPIRATION) {
            return self.add_forever(claims).await;
        }

        let key = self.key(claims)?;
        let ttl_minutes = self.minutes_until_expired(claims)?;
        let entry = Entry::valid_until(
            Utc::now()
                .timestamp()
                .saturating_add(self.grace_period_seconds),
        );

        self.store.put(&key, encode_entry(&entry)?, ttl_minutes).await?;
        debug!(
            "Whitelisted {} for {} minutes, in force from {:?}",
            key, ttl_minutes, entry
        );
        Ok(true)
    }

    /// Whitelist a token's claims with no expiry and no grace period.
    pub async fn add_forever(&self, claims: &ClaimSet) -> Result<bool, Error> {
        let key = self.key(claims)?;

        self.store
            .put_forever(&key, encode_entry(&Entry::forever())?)
            .await?;
        debug!("Whitelisted {} forever", key);
        Ok(true)
    }

    /// Whether the claims have an entry in force.
    ///
    /// A freshly added entry with a non-zero grace period is *not* in force until the
    /// grace period has elapsed, so a token encoded moments ago can fail this check.
    pub async fn has(&self, claims: &ClaimSet) -> Result<bool, Error> {
        let key = self.key(claims)?;

        let Some(value) = self.store.get(&key).await? else {
            return Ok(false);
        };
        let entry: Entry = serde_json::from_value(value).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Store(StoreErrorKind::Corrupt),
        })?;

        let in_force = entry.is_in_force_at(Utc::now().timestamp());
        if !in_force {
            debug!("Entry {} is still inside its grace period", key);
        }
        Ok(in_force)
    }

    /// Remove the claims' entry, returning whether one existed.
    pub async fn remove(&self, claims: &ClaimSet) -> Result<bool, Error> {
        let key = self.key(claims)?;

        let removed = self.store.delete(&key).await?;
        debug!("Removed whitelist entry {} (present: {})", key, removed);
        Ok(removed)
    }

    /// Remove every entry.
    pub async fn clear(&self) -> Result<bool, Error> {
        self.store.flush().await?;
        debug!("Cleared the whitelist");
        Ok(true)
    }

    /// Whole minutes, rounded up, for which the claims' entry must be kept: until the
    /// later of `exp` and `iat` plus the refresh window, plus one extra minute.
    pub fn minutes_until_expired(&self, claims: &ClaimSet) -> Result<i64, Error> {
        self.minutes_until_expired_at(claims, Utc::now().timestamp())
    }

    fn minutes_until_expired_at(&self, claims: &ClaimSet, now: i64) -> Result<i64, Error> {
        let expires_at = claims.exp().ok_or_else(|| {
            claims_error(
                ClaimsErrorKind::Invalid,
                "Expiration (exp) claim is missing or not a timestamp",
            )
        })?;
        let refreshable_until = claims
            .iat()
            .map(|issued_at| {
                issued_at.saturating_add(self.refresh_window_minutes.saturating_mul(60))
            })
            .unwrap_or(expires_at);

        let keep_until = expires_at.max(refreshable_until).saturating_add(60);
        let seconds = keep_until.saturating_sub(now).max(0);
        Ok(seconds / 60 + i64::from(seconds % 60 != 0))
    }

    pub(crate) fn key(&self, claims: &ClaimSet) -> Result<String, Error> {
        claims.key_value(&self.key_claim).ok_or_else(|| {
            claims_error(
                ClaimsErrorKind::Missing,
                &format!("Registry key claim {} is missing", self.key_claim),
            )
        })
    }
}

fn encode_entry(entry: &Entry) -> Result<serde_json::Value, Error> {
    serde_json::to_value(entry).map_err(|e| Error {
        source: Some(Box::new(e)),
        error_kind: ErrorKind::Store(StoreErrorKind::Corrupt),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::{ISSUED_AT, SUBJECT, TOKEN_ID};
    use crate::error::store_error;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct UnavailableStore;

    #[async_trait]
    impl Store for UnavailableStore {
        async fn put(&self, _key: &str, _value: Value, _ttl: i64) -> Result<(), Error> {
            Err(store_error(StoreErrorKind::Unavailable, "down"))
        }

        async fn put_forever(&self, _key: &str, _value: Value) -> Result<(), Error> {
            Err(store_error(StoreErrorKind::Unavailable, "down"))
        }

        async fn get(&self, _key: &str) -> Result<Option<Value>, Error> {
            Err(store_error(StoreErrorKind::Unavailable, "down"))
        }

        async fn delete(&self, _key: &str) -> Result<bool, Error> {
            Err(store_error(StoreErrorKind::Unavailable, "down"))
        }

        async fn flush(&self) -> Result<(), Error> {
            Err(store_error(StoreErrorKind::Unavailable, "down"))
        }
    }

    fn claims_expiring_in(minutes: i64) -> ClaimSet {
        let now = Utc::now().timestamp();
        ClaimSet::new()
            .with(SUBJECT, "user-1")
            .with(ISSUED_AT, now)
            .with(EXPIRATION, now + minutes * 60)
            .with(TOKEN_ID, "token-1")
    }

    #[test]
    fn test_entry_serialized_forms() {
        assert_eq!(serde_json::to_value(Entry::forever()).unwrap(), json!("forever"));
        assert_eq!(
            serde_json::to_value(Entry::valid_until(42)).unwrap(),
            json!({"valid_until": 42})
        );
        assert_eq!(
            serde_json::from_value::<Entry>(json!({"valid_until": 42})).unwrap(),
            Entry::valid_until(42)
        );
    }

    #[test]
    fn test_refresh_window_dominates_entry_ttl() {
        let whitelist = Whitelist::new(MemoryStore::new());
        let now = 1_700_000_000;
        let claims = ClaimSet::new()
            .with(ISSUED_AT, now)
            .with(EXPIRATION, now + 60 * 60)
            .with(TOKEN_ID, "a");

        let minutes = whitelist.minutes_until_expired_at(&claims, now).unwrap();

        assert_eq!(minutes, 20160 + 1);
    }

    #[test]
    fn test_expiry_dominates_entry_ttl_when_later() {
        let mut whitelist = Whitelist::new(MemoryStore::new());
        whitelist.set_refresh_window_minutes(30);
        let now = 1_700_000_000;
        let claims = ClaimSet::new()
            .with(ISSUED_AT, now)
            .with(EXPIRATION, now + 120 * 60)
            .with(TOKEN_ID, "a");

        let minutes = whitelist.minutes_until_expired_at(&claims, now).unwrap();

        assert_eq!(minutes, 121);
    }

    #[test]
    fn test_entry_ttl_rounds_partial_minutes_up() {
        let whitelist = Whitelist::new(MemoryStore::new());
        let issued_at = 1_700_000_000;
        let claims = ClaimSet::new()
            .with(ISSUED_AT, issued_at)
            .with(EXPIRATION, issued_at + 60 * 60)
            .with(TOKEN_ID, "a");

        let minutes = whitelist
            .minutes_until_expired_at(&claims, issued_at + 1)
            .unwrap();

        assert_eq!(minutes, 20160 + 1);
    }

    #[test]
    fn test_entry_ttl_is_never_negative() {
        let whitelist = Whitelist::new(MemoryStore::new());
        let claims = ClaimSet::new()
            .with(ISSUED_AT, 0)
            .with(EXPIRATION, 60)
            .with(TOKEN_ID, "a");

        let minutes = whitelist
            .minutes_until_expired_at(&claims, 1_700_000_000)
            .unwrap();

        assert_eq!(minutes, 0);
    }

    #[test]
    fn test_entry_ttl_saturates_for_far_future_expiry() {
        let whitelist = Whitelist::new(MemoryStore::new());
        let claims = ClaimSet::new()
            .with(ISSUED_AT, 1_700_000_000)
            .with(EXPIRATION, i64::MAX)
            .with(TOKEN_ID, "a");

        let minutes = whitelist
            .minutes_until_expired_at(&claims, 1_700_000_000)
            .unwrap();

        assert!(minutes > 0);
    }

    #[test]
    fn test_entry_in_force_once_grace_elapses() {
        let entry = Entry::valid_until(1_700_000_000);

        assert!(!entry.is_in_force_at(1_700_000_000 - 1));
        assert!(entry.is_in_force_at(1_700_000_000));
        assert!(entry.is_in_force_at(1_700_000_000 + 1));
    }

    #[test]
    fn test_forever_entry_always_in_force() {
        assert!(Entry::forever().is_in_force_at(i64::MIN));
        assert!(Entry::forever().is_in_force_at(i64::MAX));
    }

    #[tokio::test]
    async fn test_has_once_stored_grace_window_has_passed() {
        let store = MemoryStore::new();
        let whitelist = Whitelist::new(store.clone());
        let claims = claims_expiring_in(60);
        let elapsed = Entry::valid_until(Utc::now().timestamp() - 1);
        store
            .put("token-1", serde_json::to_value(elapsed).unwrap(), 10)
            .await
            .unwrap();

        assert!(whitelist.has(&claims).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_then_has_without_grace_period() {
        let whitelist = Whitelist::new(MemoryStore::new());
        let claims = claims_expiring_in(60);

        assert!(whitelist.add(&claims).await.unwrap());
        assert!(whitelist.has(&claims).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_then_has_inside_grace_period() {
        let mut whitelist = Whitelist::new(MemoryStore::new());
        whitelist.set_grace_period_seconds(300);
        let claims = claims_expiring_in(60);

        whitelist.add(&claims).await.unwrap();

        assert!(!whitelist.has(&claims).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_without_exp_is_forever() {
        let store = MemoryStore::new();
        let mut whitelist = Whitelist::new(store.clone());
        whitelist.set_grace_period_seconds(300);
        let claims = ClaimSet::new().with(SUBJECT, "user-1").with(TOKEN_ID, "t");

        whitelist.add(&claims).await.unwrap();

        assert_eq!(store.get("t").await.unwrap(), Some(json!("forever")));
        assert!(whitelist.has(&claims).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_forever_ignores_invalid_exp() {
        let whitelist = Whitelist::new(MemoryStore::new());
        let claims = ClaimSet::new()
            .with(TOKEN_ID, "t")
            .with(EXPIRATION, "not a timestamp");

        whitelist.add_forever(&claims).await.unwrap();

        assert!(whitelist.has(&claims).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_then_has() {
        let whitelist = Whitelist::new(MemoryStore::new());
        let claims = claims_expiring_in(60);
        whitelist.add(&claims).await.unwrap();

        assert!(whitelist.remove(&claims).await.unwrap());
        assert!(!whitelist.has(&claims).await.unwrap());
        assert!(!whitelist.remove(&claims).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_removes_all_entries() {
        let whitelist = Whitelist::new(MemoryStore::new());
        let claims = claims_expiring_in(60);
        let forever = ClaimSet::new().with(TOKEN_ID, "forever-token");
        whitelist.add(&claims).await.unwrap();
        whitelist.add_forever(&forever).await.unwrap();

        assert!(whitelist.clear().await.unwrap());

        assert!(!whitelist.has(&claims).await.unwrap());
        assert!(!whitelist.has(&forever).await.unwrap());
    }

    #[tokio::test]
    async fn test_custom_key_claim() {
        let store = MemoryStore::new();
        let mut whitelist = Whitelist::new(store.clone());
        whitelist.set_key_claim("sid");
        let claims = claims_expiring_in(60).with("sid", 7);

        whitelist.add(&claims).await.unwrap();

        assert!(store.get("7").await.unwrap().is_some());
        assert!(store.get("token-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_key_claim_is_an_error() {
        let whitelist = Whitelist::new(MemoryStore::new());
        let claims = ClaimSet::new().with(SUBJECT, "user-1");

        let err = whitelist.has(&claims).await.unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::Claims(ClaimsErrorKind::Missing));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_reported() {
        let store = MemoryStore::new();
        store.put_forever("token-1", json!("bogus")).await.unwrap();
        let whitelist = Whitelist::new(store);

        let err = whitelist.has(&claims_expiring_in(60)).await.unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::Store(StoreErrorKind::Corrupt));
    }

    #[tokio::test]
    async fn test_store_failures_propagate() {
        let whitelist = Whitelist::new(UnavailableStore);
        let claims = claims_expiring_in(60);
        let unavailable = ErrorKind::Store(StoreErrorKind::Unavailable);

        assert_eq!(whitelist.add(&claims).await.unwrap_err().error_kind, unavailable);
        assert_eq!(whitelist.has(&claims).await.unwrap_err().error_kind, unavailable);
        assert_eq!(whitelist.remove(&claims).await.unwrap_err().error_kind, unavailable);
        assert_eq!(whitelist.clear().await.unwrap_err().error_kind, unavailable);
    }
}
