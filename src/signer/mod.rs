//! Turning claim sets into signed strings and back.

mod jwt;

pub use jwt::JwtSigner;

use crate::claims::ClaimSet;
use crate::error::Error;

/// Signs claim sets and verifies signed strings.
///
/// Cryptographic correctness is the implementation's responsibility. `verify` fails with
/// `SignatureErrorKind::Invalid` for tampered or malformed input and may fail with
/// `TokenErrorKind::Expired`; `sign` fails with `SignatureErrorKind::SigningFailed`.
/// Implementations should leave `exp` to the claim set builder so tokens that are past
/// expiry but still refreshable can be decoded during a refresh.
pub trait Signer: Send + Sync {
    fn sign(&self, claims: &ClaimSet) -> Result<String, Error>;

    fn verify(&self, token: &str) -> Result<ClaimSet, Error>;
}
