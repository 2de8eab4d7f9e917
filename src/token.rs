//! Signed bearer tokens.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};

/// An opaque signed token produced from exactly one claim set.
///
/// The signed string is held as a secret: it is never printed by `Debug`, and callers
/// must go through [`Token::as_str`] to read it.
#[derive(Clone)]
pub struct Token {
    value: SecretString,
}

impl Token {
    pub fn new(value: String) -> Self {
        Self {
            value: SecretString::new(value),
        }
    }

    pub fn as_str(&self) -> &str {
        self.value.expose_secret()
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Token {}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token").field("value", &"[REDACTED]").finish()
    }
}
