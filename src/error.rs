//! Error types for the `token_whitelist` crate.
//!
//! Follows the same pattern as the rest of the workspace: a root `Error` struct holding an
//! optional source for chaining and a tree of error kind enums. Callers match on `error_kind`;
//! the source carries the human readable detail.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for token lifecycle operations.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Token(TokenErrorKind),
    Signature(SignatureErrorKind),
    Store(StoreErrorKind),
    Claims(ClaimsErrorKind),
}

/// Authorization and validity failures of a presented token.
#[derive(Debug, PartialEq)]
pub enum TokenErrorKind {
    /// No entry in force for the token: never issued, revoked, expired from the
    /// store, or still inside its grace period. Deliberately not distinguished.
    NotWhitelisted,
    Expired,
    /// Not usable yet (`nbf` or `iat` in the future).
    Invalid,
}

/// Failures surfaced by the signer.
#[derive(Debug, PartialEq)]
pub enum SignatureErrorKind {
    Invalid,
    SigningFailed,
}

/// Failures surfaced by the backing key-value store.
#[derive(Debug, PartialEq)]
pub enum StoreErrorKind {
    Unavailable,
    /// A value was found under a registry key but is not a registry entry.
    Corrupt,
}

/// Claim sets that cannot be built or keyed.
#[derive(Debug, PartialEq)]
pub enum ClaimsErrorKind {
    Missing,
    Invalid,
}

impl Error {
    /// True when the error means the token is not (or no longer) authorized.
    pub fn is_not_whitelisted(&self) -> bool {
        self.error_kind == ErrorKind::Token(TokenErrorKind::NotWhitelisted)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let detail = self
            .source
            .as_ref()
            .map(|source| format!(": {source}"))
            .unwrap_or_default();
        match &self.error_kind {
            ErrorKind::Token(kind) => write!(f, "Token error: {:?}{}", kind, detail),
            ErrorKind::Signature(kind) => write!(f, "Signature error: {:?}{}", kind, detail),
            ErrorKind::Store(kind) => write!(f, "Store error: {:?}{}", kind, detail),
            ErrorKind::Claims(kind) => write!(f, "Claims error: {:?}{}", kind, detail),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

// Translation of verification failures. Signing failures are mapped explicitly at the
// call site since the same library error types occur on both paths.
impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind as JwtErrorKind;

        let error_kind = match err.kind() {
            JwtErrorKind::ExpiredSignature => ErrorKind::Token(TokenErrorKind::Expired),
            JwtErrorKind::ImmatureSignature => ErrorKind::Token(TokenErrorKind::Invalid),
            _ => ErrorKind::Signature(SignatureErrorKind::Invalid),
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

/// Helper function to create token errors.
pub fn token_error(kind: TokenErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Token(kind),
    }
}

/// Helper function to create signature errors.
pub fn signature_error(kind: SignatureErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Signature(kind),
    }
}

/// Helper function to create store errors.
pub fn store_error(kind: StoreErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Store(kind),
    }
}

/// Helper function to create claim errors.
pub fn claims_error(kind: ClaimsErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Claims(kind),
    }
}
