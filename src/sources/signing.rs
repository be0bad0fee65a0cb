//! Client authentication for the token request.
//!
//! A strategy is picked once from the settings: a shared secret (HTTP Basic
//! or form fields) or a private key producing a fresh signed assertion per
//! request.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use uuid::Uuid;

use crate::config::auth::AuthSettings;
use crate::error::{AuthError, AuthResult};
use crate::helpers::time::now_i64;
use crate::sources::jwk::PrivateKey;
use crate::utils::constants::{
    AUTH_METHOD_CLIENT_SECRET_BASIC, AUTH_METHOD_CLIENT_SECRET_POST, AUTH_METHOD_PRIVATE_KEY_JWT,
};

pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
pub const ASSERTION_LIFETIME_SECONDS: i64 = 300;

/// Claims of a `private_key_jwt` client assertion.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AssertionClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl AssertionClaims {
    pub fn new(client_id: &str, token_endpoint: &str, issued_at: i64) -> Self {
        Self {
            iss: client_id.to_string(),
            sub: client_id.to_string(),
            aud: token_endpoint.to_string(),
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECONDS,
            jti: Uuid::new_v4().to_string(),
        }
    }
}

/// What a strategy contributes to one token request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientAuthentication {
    /// Full `Authorization` header value.
    pub authorization: Option<String>,
    /// Extra form fields, appended after `grant_type` and `scope`.
    pub form: Vec<(String, String)>,
}

#[derive(Clone)]
pub enum SigningStrategy {
    Symmetric {
        client_id: String,
        client_secret: String,
        use_form: bool,
    },
    Asymmetric {
        client_id: String,
        key: Arc<PrivateKey>,
    },
}

impl SigningStrategy {
    /// Picks the strategy for validated settings.
    ///
    /// A configured private key wins over a client secret. Key material is
    /// parsed here so a broken JWK fails before the first token request.
    pub fn from_settings(settings: &AuthSettings) -> AuthResult<Self> {
        let client_id = settings
            .client_id
            .clone()
            .ok_or_else(|| AuthError::key_material("client_id is required to authenticate"))?;

        if let Some(jwk) = settings.private_key_jwk.as_deref() {
            let key = PrivateKey::from_jwk(jwk)?;
            return Ok(Self::Asymmetric {
                client_id,
                key: Arc::new(key),
            });
        }

        match settings.client_secret.clone() {
            Some(client_secret) => Ok(Self::Symmetric {
                client_id,
                client_secret,
                use_form: settings.use_form_for_basic_auth,
            }),
            None => Err(AuthError::key_material(
                "either client_secret or private_key_jwk must be configured",
            )),
        }
    }

    pub fn client_id(&self) -> &str {
        match self {
            Self::Symmetric { client_id, .. } | Self::Asymmetric { client_id, .. } => client_id,
        }
    }

    /// `token_endpoint_auth_method` name as advertised in discovery.
    pub fn auth_method(&self) -> &'static str {
        match self {
            Self::Symmetric { use_form: false, .. } => AUTH_METHOD_CLIENT_SECRET_BASIC,
            Self::Symmetric { use_form: true, .. } => AUTH_METHOD_CLIENT_SECRET_POST,
            Self::Asymmetric { .. } => AUTH_METHOD_PRIVATE_KEY_JWT,
        }
    }

    /// Signing algorithm of the assertion, `None` for shared secrets.
    pub fn signing_algorithm(&self) -> Option<&'static str> {
        match self {
            Self::Symmetric { .. } => None,
            Self::Asymmetric { key, .. } => Some(key.algorithm().as_str()),
        }
    }

    /// Builds the authentication parts for one request to `token_endpoint`.
    ///
    /// Assertions are never reused: each call signs new claims with a new `jti`.
    pub fn authenticate(&self, token_endpoint: &str) -> AuthResult<ClientAuthentication> {
        match self {
            Self::Symmetric {
                client_id,
                client_secret,
                use_form: false,
            } => {
                let credentials = STANDARD.encode(format!("{}:{}", client_id, client_secret));
                Ok(ClientAuthentication {
                    authorization: Some(format!("Basic {}", credentials)),
                    form: Vec::new(),
                })
            }
            Self::Symmetric {
                client_id,
                client_secret,
                use_form: true,
            } => Ok(ClientAuthentication {
                authorization: None,
                form: vec![
                    ("client_id".to_string(), client_id.clone()),
                    ("client_secret".to_string(), client_secret.clone()),
                ],
            }),
            Self::Asymmetric { client_id, key } => {
                let claims = AssertionClaims::new(client_id, token_endpoint, now_i64());
                let assertion = key.sign(&claims)?;
                Ok(ClientAuthentication {
                    authorization: None,
                    form: vec![
                        ("client_id".to_string(), client_id.clone()),
                        ("client_assertion_type".to_string(), CLIENT_ASSERTION_TYPE.to_string()),
                        ("client_assertion".to_string(), assertion),
                    ],
                })
            }
        }
    }
}

impl std::fmt::Debug for SigningStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Symmetric { client_id, use_form, .. } => f
                .debug_struct("Symmetric")
                .field("client_id", client_id)
                .field("use_form", use_form)
                .finish_non_exhaustive(),
            Self::Asymmetric { client_id, key } => f
                .debug_struct("Asymmetric")
                .field("client_id", client_id)
                .field("key", key)
                .finish(),
        }
    }
}
