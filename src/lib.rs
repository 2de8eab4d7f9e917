//! # token_whitelist
//!
//! Lifecycle management for bearer tokens backed by a whitelist:
//! - Issuing tokens and registering them as authorized
//! - Decoding tokens, honoring only those with a whitelist entry in force
//! - Refreshing tokens, revoking the old one before registering its successor
//! - Invalidating tokens
//!
//! ## Architecture
//!
//! [`Manager`] is the only component that sees both the [`Signer`] and the [`Whitelist`].
//! The whitelist wraps a key-value [`Store`]; claim sets are assembled and time-checked by
//! a [`ClaimSetBuilder`] that receives a per-operation [`Flow`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use token_whitelist::{ClaimSet, Factory, JwtSigner, Manager, MemoryStore, Whitelist};
//!
//! let manager = Manager::new(
//!     JwtSigner::new(b"secret"),
//!     Whitelist::new(MemoryStore::new()),
//!     Factory::new(),
//! );
//! let token = manager.issue(ClaimSet::new().with("sub", "user-1")).await?;
//! let refreshed = manager.refresh(&token).await?;
//! ```

pub mod builder;
pub mod claims;
pub mod error;
pub mod flow;
pub mod manager;
pub mod registry;
pub mod signer;
pub mod store;
pub mod token;

// Re-export commonly used types
pub use builder::{ClaimSetBuilder, Factory};
pub use claims::ClaimSet;
pub use error::{Error, ErrorKind};
pub use flow::Flow;
pub use manager::Manager;
pub use registry::{Entry, Whitelist};
pub use signer::{JwtSigner, Signer};
pub use store::{MemoryStore, Store};
pub use token::Token;
