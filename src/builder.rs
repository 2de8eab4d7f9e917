//! Claim set construction and time-claim validation.

use chrono::Utc;
use rand::Rng;
use service::config::{Config, DEFAULT_REFRESH_WINDOW_MINUTES, DEFAULT_TOKEN_TTL_MINUTES};

use crate::claims::{ClaimSet, EXPIRATION, ISSUED_AT, ISSUER, NOT_BEFORE, TOKEN_ID};
use crate::error::{claims_error, token_error, ClaimsErrorKind, Error, TokenErrorKind};
use crate::flow::Flow;

/// Builds the claim sets the manager signs and accepts.
pub trait ClaimSetBuilder: Send + Sync {
    /// Builds the claims of a new token from the flow's custom claims.
    ///
    /// Outside a refresh flow fresh `iat` and `jti` are minted. Inside a refresh flow the
    /// carried `sub` and `iat` must be present in the custom claims and are kept as is.
    fn mint(&self, flow: &Flow) -> Result<ClaimSet, Error>;

    /// Accepts claims decoded from a verified token, checking its time claims against
    /// the rules of the current flow.
    fn build(&self, raw: ClaimSet, flow: &Flow) -> Result<ClaimSet, Error>;
}

/// The default claim set builder.
#[derive(Debug, Clone)]
pub struct Factory {
    ttl_minutes: Option<i64>,
    refresh_window_minutes: i64,
    leeway_seconds: i64,
    issuer: Option<String>,
}

impl Default for Factory {
    fn default() -> Self {
        Self {
            ttl_minutes: Some(DEFAULT_TOKEN_TTL_MINUTES),
            refresh_window_minutes: DEFAULT_REFRESH_WINDOW_MINUTES,
            leeway_seconds: 0,
            issuer: None,
        }
    }
}

impl Factory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            ttl_minutes: config.token_ttl_minutes(),
            refresh_window_minutes: config.refresh_window_minutes,
            leeway_seconds: config.leeway_seconds,
            issuer: config.issuer(),
        }
    }

    /// `None` issues tokens without an `exp` claim.
    pub fn with_ttl_minutes(mut self, ttl_minutes: Option<i64>) -> Self {
        self.ttl_minutes = ttl_minutes;
        self
    }

    pub fn with_refresh_window_minutes(mut self, refresh_window_minutes: i64) -> Self {
        self.refresh_window_minutes = refresh_window_minutes;
        self
    }

    pub fn set_refresh_window_minutes(&mut self, refresh_window_minutes: i64) -> &mut Self {
        self.refresh_window_minutes = refresh_window_minutes;
        self
    }

    pub fn with_leeway_seconds(mut self, leeway_seconds: i64) -> Self {
        self.leeway_seconds = leeway_seconds;
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn ttl_minutes(&self) -> Option<i64> {
        self.ttl_minutes
    }

    pub fn refresh_window_minutes(&self) -> i64 {
        self.refresh_window_minutes
    }

    fn mint_at(&self, flow: &Flow, now: i64) -> Result<ClaimSet, Error> {
        let mut claims = ClaimSet::new();
        if let Some(issuer) = &self.issuer {
            claims.insert(ISSUER, issuer.clone());
        }
        claims.insert(ISSUED_AT, now);
        claims.insert(NOT_BEFORE, now);
        if let Some(ttl_minutes) = self.ttl_minutes {
            claims.insert(EXPIRATION, now.saturating_add(ttl_minutes.saturating_mul(60)));
        }
        claims.insert(TOKEN_ID, generate_token_id());

        for (name, value) in flow.custom_claims().iter() {
            // jti is always fresh; iat is only carried inside a refresh
            if name == TOKEN_ID || (name == ISSUED_AT && !flow.is_refresh()) {
                continue;
            }
            claims.insert(name.clone(), value.clone());
        }

        if claims.sub().is_none() {
            return Err(claims_error(
                ClaimsErrorKind::Missing,
                "A subject (sub) claim is required to issue a token",
            ));
        }
        if flow.is_refresh() && !flow.custom_claims().has(ISSUED_AT) {
            return Err(claims_error(
                ClaimsErrorKind::Missing,
                "A carried issued-at (iat) claim is required to refresh a token",
            ));
        }
        let issued_at = claims.iat().ok_or_else(|| {
            claims_error(
                ClaimsErrorKind::Invalid,
                "Issued-at (iat) claim is not a timestamp",
            )
        })?;
        if let Some(expires_at) = claims.exp() {
            if expires_at < issued_at {
                return Err(claims_error(
                    ClaimsErrorKind::Invalid,
                    "Expiration (exp) precedes issued-at (iat)",
                ));
            }
        }

        Ok(claims)
    }

    fn build_at(&self, raw: ClaimSet, flow: &Flow, now: i64) -> Result<ClaimSet, Error> {
        let leeway = self.leeway_seconds;

        let issued_at = match (raw.has(ISSUED_AT), raw.iat()) {
            (_, Some(issued_at)) => issued_at,
            (true, None) => {
                return Err(claims_error(
                    ClaimsErrorKind::Invalid,
                    "Issued-at (iat) claim is not a timestamp",
                ))
            }
            (false, None) => {
                return Err(claims_error(
                    ClaimsErrorKind::Missing,
                    "Issued-at (iat) claim is missing",
                ))
            }
        };
        if raw.has(EXPIRATION) && raw.exp().is_none() {
            return Err(claims_error(
                ClaimsErrorKind::Invalid,
                "Expiration (exp) claim is not a timestamp",
            ));
        }

        if issued_at > now.saturating_add(leeway) {
            return Err(token_error(
                TokenErrorKind::Invalid,
                "Token issued-at (iat) is in the future",
            ));
        }
        if let Some(not_before) = raw.nbf() {
            if not_before > now.saturating_add(leeway) {
                return Err(token_error(
                    TokenErrorKind::Invalid,
                    "Token is not valid before its nbf timestamp",
                ));
            }
        }

        if flow.is_refresh() {
            let refreshable_until = issued_at
                .saturating_add(self.refresh_window_minutes.saturating_mul(60))
                .saturating_add(leeway);
            if refreshable_until < now {
                return Err(token_error(
                    TokenErrorKind::Expired,
                    "Token has expired and can no longer be refreshed",
                ));
            }
        } else if let Some(expires_at) = raw.exp() {
            if expires_at.saturating_add(leeway) <= now {
                return Err(token_error(TokenErrorKind::Expired, "Token has expired"));
            }
        }

        Ok(raw)
    }
}

impl ClaimSetBuilder for Factory {
    fn mint(&self, flow: &Flow) -> Result<ClaimSet, Error> {
        self.mint_at(flow, Utc::now().timestamp())
    }

    fn build(&self, raw: ClaimSet, flow: &Flow) -> Result<ClaimSet, Error> {
        self.build_at(raw, flow, Utc::now().timestamp())
    }
}

/// Generate a random 128-bit token identifier, hex encoded.
fn generate_token_id() -> String {
    let random_bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(random_bytes)
}
