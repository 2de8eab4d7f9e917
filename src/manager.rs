//! Token lifecycle manager with per-token refresh locking.
//!
//! The manager is the only component that talks to both the signer and the whitelist.
//! Every runtime operation takes `&self` and builds its own [`Flow`], so one manager can
//! be shared (e.g. behind an `Arc`) by concurrent callers once configured.

use std::sync::Arc;

use dashmap::DashMap;
use service::config::Config;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::builder::{ClaimSetBuilder, Factory};
use crate::claims::{ClaimSet, ALWAYS_PERSISTENT};
use crate::error::{token_error, Error, ErrorKind, TokenErrorKind};
use crate::flow::Flow;
use crate::registry::Whitelist;
use crate::signer::{JwtSigner, Signer};
use crate::store::Store;
use crate::token::Token;

/// Coordinates signing, decoding and whitelist state transitions.
///
/// Only whitelisted tokens decode successfully. Refreshing a token removes its entry
/// before the successor is registered, so a failure part way through leaves the subject
/// with no valid token rather than two.
///
/// Concurrent refreshes of the same token within one manager are serialized on a lock
/// keyed by the token's whitelist key. The second caller re-checks the whitelist after
/// acquiring the lock and fails with `TokenErrorKind::NotWhitelisted`.
pub struct Manager<S: Store, G: Signer, B: ClaimSetBuilder = Factory> {
    signer: G,
    whitelist: Whitelist<S>,
    builder: B,
    persistent_claims: Vec<String>,
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<S: Store> Manager<S, JwtSigner, Factory> {
    /// Create a manager with an HS256 signer, the default builder and a whitelist over
    /// `store`, all configured from `config`.
    pub fn from_config(store: S, config: &Config) -> Result<Self, Error> {
        let mut manager = Self::new(
            JwtSigner::from_config(config)?,
            Whitelist::from_config(store, config),
            Factory::from_config(config),
        );
        manager.set_persistent_claims(config.persistent_claims.clone());
        Ok(manager)
    }
}

impl<S: Store, G: Signer> Manager<S, G, Factory> {
    /// Set how long after original issuance a token may be refreshed. Updates both the
    /// builder's refreshability check and the whitelist's entry TTL sizing.
    pub fn set_refresh_window_minutes(&mut self, refresh_window_minutes: i64) -> &mut Self {
        self.builder
            .set_refresh_window_minutes(refresh_window_minutes);
        self.whitelist
            .set_refresh_window_minutes(refresh_window_minutes);
        self
    }
}

impl<S: Store, G: Signer, B: ClaimSetBuilder> Manager<S, G, B> {
    pub fn new(signer: G, whitelist: Whitelist<S>, builder: B) -> Self {
        Self {
            signer,
            whitelist,
            builder,
            persistent_claims: Vec::new(),
            refresh_locks: DashMap::new(),
        }
    }

    /// Claims copied from a token into its refreshed successor, in addition to `sub`
    /// and `iat` which are always carried.
    pub fn set_persistent_claims(&mut self, persistent_claims: Vec<String>) -> &mut Self {
        self.persistent_claims = persistent_claims;
        self
    }

    pub fn persistent_claims(&self) -> &[String] {
        &self.persistent_claims
    }

    pub fn whitelist(&self) -> &Whitelist<S> {
        &self.whitelist
    }

    /// Access to the whitelist's configuration setters.
    ///
    /// The refresh window is also enforced by the builder; with the default builder use
    /// [`Manager::set_refresh_window_minutes`] to change both together.
    pub fn whitelist_mut(&mut self) -> &mut Whitelist<S> {
        &mut self.whitelist
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    /// Mint a fresh claim set from `custom_claims` (which must name a `sub`) and encode it.
    pub async fn issue(&self, custom_claims: ClaimSet) -> Result<Token, Error> {
        let claims = self
            .builder
            .mint(&Flow::new().with_custom_claims(custom_claims))?;
        self.encode(&claims).await
    }

    /// Sign `claims` and whitelist the resulting token.
    pub async fn encode(&self, claims: &ClaimSet) -> Result<Token, Error> {
        let token = Token::new(self.signer.sign(claims)?);
        self.validate(&token).await?;
        Ok(token)
    }

    /// Verify the token and return its claims if it is whitelisted.
    pub async fn decode(&self, token: &Token) -> Result<ClaimSet, Error> {
        self.decode_in(token, &Flow::new()).await
    }

    /// Verify the token without consulting the whitelist.
    pub fn raw_decode(&self, token: &Token) -> Result<ClaimSet, Error> {
        self.raw_decode_in(token, &Flow::new())
    }

    /// Whether the token currently decodes.
    ///
    /// Authorization, signature and claim failures yield `false`; store failures are
    /// still returned as errors since they say nothing about the token.
    pub async fn check(&self, token: &Token) -> Result<bool, Error> {
        match self.decode(token).await {
            Ok(_) => Ok(true),
            Err(err) if matches!(err.error_kind, ErrorKind::Store(_)) => Err(err),
            Err(err) => {
                debug!("Token check failed: {}", err);
                Ok(false)
            }
        }
    }

    /// Exchange a whitelisted token for a new one carrying its persistent claims.
    pub async fn refresh(&self, token: &Token) -> Result<Token, Error> {
        self.refresh_with_claims(token, ClaimSet::new()).await
    }

    /// Like [`Manager::refresh`], with `custom_claims` added to the successor.
    /// Carried claims win over custom claims of the same name.
    pub async fn refresh_with_claims(
        &self,
        token: &Token,
        custom_claims: ClaimSet,
    ) -> Result<Token, Error> {
        let flow = Flow::refresh().with_custom_claims(custom_claims);
        let claims = self.raw_decode_in(token, &flow)?;
        let key = self.whitelist.key(&claims)?;

        // Get or create a lock for this token
        let lock = self
            .refresh_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let _cleanup = RefreshLockGuard {
            locks: &self.refresh_locks,
            key,
            lock: lock.clone(),
        };

        let result = {
            let _guard = lock.lock().await;
            self.refresh_locked(&claims, &flow).await
        };
        result
    }

    /// Remove a whitelisted token's entry.
    pub async fn invalidate(&self, token: &Token) -> Result<bool, Error> {
        let claims = self.decode(token).await?;
        self.whitelist.remove(&claims).await
    }

    /// Whitelist a token that verifies, whether or not it is already whitelisted.
    pub async fn validate(&self, token: &Token) -> Result<bool, Error> {
        let claims = self.raw_decode(token)?;
        self.whitelist.add(&claims).await
    }

    async fn refresh_locked(&self, claims: &ClaimSet, flow: &Flow) -> Result<Token, Error> {
        // Another refresh may have consumed this token while we waited for the lock
        self.authorize(claims).await?;

        let carried = self.build_refresh_claims(claims, flow.custom_claims());
        let successor = self
            .builder
            .mint(&Flow::refresh().with_custom_claims(carried))?;

        // The delete is the only per-key atomic step; if the entry is already gone
        // someone else consumed the token and no successor may be issued
        if !self.whitelist.remove(claims).await? {
            warn!("Token {:?} was revoked during refresh", claims.jti());
            return Err(token_error(
                TokenErrorKind::NotWhitelisted,
                "Token was revoked during refresh",
            ));
        }
        let token = self.encode(&successor).await?;

        debug!(
            "Refreshed token {:?} into {:?} for subject {:?}",
            claims.jti(),
            successor.jti(),
            successor.sub()
        );
        Ok(token)
    }

    fn build_refresh_claims(&self, claims: &ClaimSet, custom_claims: &ClaimSet) -> ClaimSet {
        let names = self
            .persistent_claims
            .iter()
            .map(String::as_str)
            .chain(ALWAYS_PERSISTENT);

        let mut refresh_claims = custom_claims.clone();
        refresh_claims.merge(&claims.subset(names));
        refresh_claims
    }

    async fn decode_in(&self, token: &Token, flow: &Flow) -> Result<ClaimSet, Error> {
        let claims = self.raw_decode_in(token, flow)?;
        self.authorize(&claims).await?;
        Ok(claims)
    }

    fn raw_decode_in(&self, token: &Token, flow: &Flow) -> Result<ClaimSet, Error> {
        let raw = self.signer.verify(token.as_str())?;
        self.builder.build(raw, flow)
    }

    async fn authorize(&self, claims: &ClaimSet) -> Result<(), Error> {
        if self.whitelist.has(claims).await? {
            return Ok(());
        }
        warn!("Rejected token {:?}: not whitelisted", claims.jti());
        Err(token_error(
            TokenErrorKind::NotWhitelisted,
            "Token is not whitelisted",
        ))
    }
}

/// Drops a token's refresh lock from the map when the refresh ends, including when the
/// refresh future is dropped before completing.
struct RefreshLockGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    lock: Arc<Mutex<()>>,
}

impl Drop for RefreshLockGuard<'_> {
    fn drop(&mut self) {
        self.locks
            .remove_if(&self.key, |_, held| Arc::ptr_eq(held, &self.lock));
    }
}
