//! HMAC-signed JSON Web Tokens.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use service::config::Config;

use super::Signer;
use crate::claims::ClaimSet;
use crate::error::{signature_error, Error, ErrorKind, SignatureErrorKind};

/// Signs claim sets as compact JWTs with a shared secret.
///
/// Only the signature and algorithm are checked on `verify`; every time claim is
/// left to the claim set builder.
pub struct JwtSigner {
    header: Header,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtSigner {
    /// Create an HS256 signer.
    pub fn new(secret: &[u8]) -> Self {
        Self::build(secret, Algorithm::HS256)
    }

    /// Create a signer for one of the HMAC algorithms (HS256, HS384, HS512).
    pub fn with_algorithm(secret: &[u8], algorithm: Algorithm) -> Result<Self, Error> {
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                Ok(Self::build(secret, algorithm))
            }
            other => Err(signature_error(
                SignatureErrorKind::SigningFailed,
                &format!("{:?} is not a shared-secret algorithm", other),
            )),
        }
    }

    /// Create an HS256 signer from the configured signing secret.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let secret = config.signing_secret().ok_or_else(|| {
            signature_error(
                SignatureErrorKind::SigningFailed,
                "No token signing secret configured",
            )
        })?;
        Ok(Self::new(secret.as_bytes()))
    }

    fn build(secret: &[u8], algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            header: Header::new(algorithm),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl Signer for JwtSigner {
    fn sign(&self, claims: &ClaimSet) -> Result<String, Error> {
        encode(&self.header, claims, &self.encoding_key).map_err(|err| Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Signature(SignatureErrorKind::SigningFailed),
        })
    }

    fn verify(&self, token: &str) -> Result<ClaimSet, Error> {
        let data = decode::<ClaimSet>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }
}
