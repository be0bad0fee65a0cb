use thiserror::Error;

use crate::config::proc_validator::Violation;

pub type AuthResult<T> = Result<T, AuthError>;

/// Errors surfaced by credential construction and token acquisition.
///
/// The type is `Clone` because a single failed exchange is handed to every
/// caller that was waiting on it.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// Invalid or contradictory settings, reported before any request is made.
    #[error("{message}")]
    Configuration {
        message: String,
        violations: Vec<Violation>,
    },

    /// The SMART configuration document could not be fetched or understood.
    #[error("SMART discovery failed: {0}")]
    Discovery(String),

    /// The configured private key could not be used for signing.
    #[error("invalid private key material: {0}")]
    KeyMaterial(String),

    /// The token endpoint rejected the request or answered with garbage.
    /// `status` is absent for transport failures and malformed bodies.
    #[error("token request failed: {message}")]
    TokenRequest {
        status: Option<u16>,
        message: String,
    },

    /// The owning credential factory has been closed.
    #[error("credential factory is closed")]
    Closed,
}

impl AuthError {
    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery(message.into())
    }

    pub fn key_material(message: impl Into<String>) -> Self {
        Self::KeyMaterial(message.into())
    }

    pub fn token_request(message: impl Into<String>) -> Self {
        Self::TokenRequest {
            status: None,
            message: message.into(),
        }
    }

    /// Non-2xx answer from the token endpoint, keeping the body for diagnostics.
    pub fn token_request_status(status: u16, body: &str) -> Self {
        Self::TokenRequest {
            status: Some(status),
            message: format!("token endpoint responded with status {}: {}", status, body),
        }
    }

    /// HTTP status carried by a `TokenRequest` failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::TokenRequest { status, .. } => *status,
            _ => None,
        }
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Discovery(_) => "discovery",
            Self::KeyMaterial(_) => "key_material",
            Self::TokenRequest { status: Some(_), .. } => "http_status",
            Self::TokenRequest { status: None, .. } => "token_request",
            Self::Closed => "closed",
        }
    }
}
