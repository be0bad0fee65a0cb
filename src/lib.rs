//! # FHIR Auth Agent Library
//!
//! SMART Backend Services token provider: resolves a FHIR server's token
//! endpoint, authenticates with a client secret or a signed private-key JWT,
//! and caches bearer tokens with a single refresh in flight per client.
//!
//! Modules:
//! - `config`: settings, YAML loading and validation
//! - `sources`: discovery, client authentication, token exchange
//! - `cache`: expiry-aware token cache
//! - `provider`: credential factory and the token provider handed to callers

pub mod cache;
pub mod config;
pub mod error;
pub mod helpers;
pub mod observability;
pub mod provider;
pub mod resilience;
pub mod server;
pub mod sources;
pub mod utils;

#[cfg(test)]
mod tests;

pub use crate::config::auth::AuthSettings;
pub use crate::config::types::ServiceConfig;
pub use crate::error::{AuthError, AuthResult};
pub use crate::provider::{CredentialFactory, TokenProvider};
