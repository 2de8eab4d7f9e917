//! Claim sets carried by tokens.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SUBJECT: &str = "sub";
pub const ISSUED_AT: &str = "iat";
pub const EXPIRATION: &str = "exp";
pub const NOT_BEFORE: &str = "nbf";
pub const TOKEN_ID: &str = "jti";
pub const ISSUER: &str = "iss";

/// Claims that are always carried from a token into its refreshed successor.
pub const ALWAYS_PERSISTENT: [&str; 2] = [SUBJECT, ISSUED_AT];

/// An ordered mapping of claim name to value.
///
/// Timestamps (`iat`, `exp`, `nbf`) are whole seconds since the Unix epoch.
/// Insertion order is preserved so a claim set serializes the way it was built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet {
    claims: Map<String, Value>,
}

impl ClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts or replaces a claim, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.claims.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.claims.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.claims.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.claims.iter()
    }

    pub fn sub(&self) -> Option<&str> {
        self.get(SUBJECT).and_then(Value::as_str)
    }

    pub fn jti(&self) -> Option<&str> {
        self.get(TOKEN_ID).and_then(Value::as_str)
    }

    pub fn iat(&self) -> Option<i64> {
        self.timestamp(ISSUED_AT)
    }

    /// `None` means the token never expires.
    pub fn exp(&self) -> Option<i64> {
        self.timestamp(EXPIRATION)
    }

    pub fn nbf(&self) -> Option<i64> {
        self.timestamp(NOT_BEFORE)
    }

    /// Reads a claim as a whole-second timestamp. Fractional values are truncated.
    pub fn timestamp(&self, name: &str) -> Option<i64> {
        let value = self.get(name)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|seconds| seconds as i64))
    }

    /// Renders a claim as a plain string, for use as a store key.
    ///
    /// Strings are used verbatim; numbers and booleans use their JSON text.
    /// Null, arrays and objects cannot identify an entry.
    pub fn key_value(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Selects the named claims present in this set, in the order `names` lists them.
    pub fn subset<'a, I>(&self, names: I) -> ClaimSet
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut subset = ClaimSet::new();
        for name in names {
            if let Some(value) = self.get(name) {
                subset.insert(name, value.clone());
            }
        }
        subset
    }

    /// Overlays every claim of `other` on top of this set.
    pub fn merge(&mut self, other: &ClaimSet) {
        for (name, value) in other.iter() {
            self.claims.insert(name.clone(), value.clone());
        }
    }
}

impl From<Map<String, Value>> for ClaimSet {
    fn from(claims: Map<String, Value>) -> Self {
        Self { claims }
    }
}

impl FromIterator<(String, Value)> for ClaimSet {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            claims: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_standard_accessors() {
        let claims = ClaimSet::new()
            .with(SUBJECT, "user-1")
            .with(ISSUED_AT, 1_700_000_000)
            .with(EXPIRATION, 1_700_003_600)
            .with(TOKEN_ID, "abc");

        assert_eq!(claims.sub(), Some("user-1"));
        assert_eq!(claims.iat(), Some(1_700_000_000));
        assert_eq!(claims.exp(), Some(1_700_003_600));
        assert_eq!(claims.jti(), Some("abc"));
        assert_eq!(claims.nbf(), None);
    }

    #[test]
    fn test_timestamp_truncates_fractional_seconds() {
        let claims = ClaimSet::new().with(ISSUED_AT, 1_700_000_000.75);

        assert_eq!(claims.iat(), Some(1_700_000_000));
    }

    #[test]
    fn test_timestamp_rejects_non_numeric_values() {
        let claims = ClaimSet::new().with(EXPIRATION, "tomorrow");

        assert_eq!(claims.exp(), None);
        assert!(claims.has(EXPIRATION));
    }

    #[test]
    fn test_subset_follows_requested_order_and_skips_missing() {
        let claims = ClaimSet::new()
            .with("role", "admin")
            .with(SUBJECT, "user-1")
            .with(ISSUED_AT, 10);

        let subset = claims.subset(["iat", "tenant", "sub", "role"]);
        let names: Vec<&String> = subset.iter().map(|(name, _)| name).collect();

        assert_eq!(names, ["iat", "sub", "role"]);
    }

    #[test]
    fn test_key_value_renders_scalars_only() {
        let claims = ClaimSet::new()
            .with("jti", "abc")
            .with("num", 42)
            .with("list", json!(["a"]));

        assert_eq!(claims.key_value("jti").as_deref(), Some("abc"));
        assert_eq!(claims.key_value("num").as_deref(), Some("42"));
        assert_eq!(claims.key_value("list"), None);
        assert_eq!(claims.key_value("missing"), None);
    }

    #[test]
    fn test_serializes_in_insertion_order() {
        let claims = ClaimSet::new().with("z", 1).with("a", 2);

        assert_eq!(
            serde_json::to_string(&claims).unwrap(),
            r#"{"z":1,"a":2}"#
        );
    }
}
