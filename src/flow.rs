//! Per-operation context threaded through claim set building.
//!
//! A `Flow` is created by the manager at the start of each operation and passed by
//! reference to the builder, so concurrent operations never observe each other's
//! refresh flag or custom claims.

use crate::claims::ClaimSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Flow {
    refresh: bool,
    custom_claims: ClaimSet,
}

impl Flow {
    /// A plain (non-refresh) operation without custom claims.
    pub fn new() -> Self {
        Self::default()
    }

    /// An operation running inside a refresh.
    pub fn refresh() -> Self {
        Self {
            refresh: true,
            custom_claims: ClaimSet::new(),
        }
    }

    pub fn with_custom_claims(mut self, custom_claims: ClaimSet) -> Self {
        self.custom_claims = custom_claims;
        self
    }

    pub fn is_refresh(&self) -> bool {
        self.refresh
    }

    /// Extra claims merged into any claim set minted during this operation.
    pub fn custom_claims(&self) -> &ClaimSet {
        &self.custom_claims
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flow_is_not_refresh() {
        let flow = Flow::new();

        assert!(!flow.is_refresh());
        assert!(flow.custom_claims().is_empty());
    }

    #[test]
    fn test_refresh_flow_keeps_custom_claims() {
        let flow = Flow::refresh().with_custom_claims(ClaimSet::new().with("role", "admin"));

        assert!(flow.is_refresh());
        assert_eq!(
            flow.custom_claims().get("role").and_then(|v| v.as_str()),
            Some("admin")
        );
    }
}
