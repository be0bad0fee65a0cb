//! SMART configuration discovery.
//!
//! Fetches `<fhir-base>/.well-known/smart-configuration` (or an explicit
//! metadata URL) and extracts the token endpoint plus the advertised
//! capabilities. The resolver is stateless; callers cache the result.

use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AuthError, AuthResult};
use crate::helpers::web::{ensure_path_ends_with_slash, parse_http_url};
use crate::observability::metrics::get_metrics;

/// Path of the SMART configuration document relative to the FHIR base.
pub const SMART_WELL_KNOWN_CONFIGURATION_PATH: &str = ".well-known/smart-configuration";

/// The parts of the SMART configuration document this crate relies on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscoveryDocument {
    pub token_endpoint: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub grant_types_supported: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub token_endpoint_auth_methods_supported: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub token_endpoint_auth_signing_alg_values_supported: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub capabilities: Vec<String>,
}

impl DiscoveryDocument {
    pub fn new(token_endpoint: impl Into<String>) -> Self {
        Self {
            token_endpoint: token_endpoint.into(),
            grant_types_supported: Vec::new(),
            token_endpoint_auth_methods_supported: Vec::new(),
            token_endpoint_auth_signing_alg_values_supported: Vec::new(),
            capabilities: Vec::new(),
        }
    }

    /// Parses and checks a discovery document body.
    pub fn from_json(body: &str) -> AuthResult<Self> {
        let malformed = |e: serde_json::Error| AuthError::discovery(format!("malformed SMART configuration: {}", e));
        let raw: Value = serde_json::from_str(body).map_err(malformed)?;
        let document: DiscoveryDocument = serde_json::from_value(lowercase_keys(raw)).map_err(malformed)?;
        if document.token_endpoint.trim().is_empty() {
            return Err(AuthError::discovery("SMART configuration has an empty token_endpoint"));
        }
        parse_http_url(&document.token_endpoint, AuthError::discovery)?;
        Ok(document)
    }

    /// An empty list means the server did not say, which is not a refusal.
    pub fn allows_auth_method(&self, method: &str) -> bool {
        advertised_or_unknown(&self.token_endpoint_auth_methods_supported, method)
    }

    pub fn allows_grant_type(&self, grant_type: &str) -> bool {
        advertised_or_unknown(&self.grant_types_supported, grant_type)
    }

    pub fn allows_signing_alg(&self, alg: &str) -> bool {
        advertised_or_unknown(&self.token_endpoint_auth_signing_alg_values_supported, alg)
    }
}

fn advertised_or_unknown(values: &[String], wanted: &str) -> bool {
    values.is_empty() || values.iter().any(|v| v == wanted)
}

/// Top-level keys are matched case-insensitively (`Token_Endpoint` works).
fn lowercase_keys(raw: Value) -> Value {
    match raw {
        Value::Object(fields) => {
            let mut lowered = Map::with_capacity(fields.len());
            for (key, value) in fields {
                lowered.entry(key.to_ascii_lowercase()).or_insert(value);
            }
            Value::Object(lowered)
        }
        other => other,
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Location of the well-known document for a FHIR base URL.
pub fn well_known_url(fhir_base: &Url) -> AuthResult<Url> {
    ensure_path_ends_with_slash(fhir_base)
        .join(SMART_WELL_KNOWN_CONFIGURATION_PATH)
        .map_err(|e| AuthError::discovery(format!("cannot build discovery URL from '{}': {}", fhir_base, e)))
}

#[derive(Debug, Clone)]
pub struct DiscoveryResolver {
    client: Client,
}

impl DiscoveryResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Resolves the SMART configuration of a FHIR server.
    pub async fn resolve(&self, fhir_base: &Url) -> AuthResult<DiscoveryDocument> {
        let url = well_known_url(fhir_base)?;
        self.resolve_from_url(&url).await
    }

    /// Fetches a configuration document from an explicit URL, without rewriting it.
    pub async fn resolve_from_url(&self, metadata_url: &Url) -> AuthResult<DiscoveryDocument> {
        let metrics = get_metrics().await;
        metrics.discovery_requests.inc();
        info!(url = %metadata_url, "fetching SMART configuration");

        let result = self.fetch(metadata_url).await;
        match &result {
            Ok(document) => debug!(
                url = %metadata_url,
                token_endpoint = %document.token_endpoint,
                "SMART configuration resolved"
            ),
            Err(e) => {
                metrics.discovery_failures.inc();
                warn!(url = %metadata_url, error = %e, "SMART discovery failed");
            }
        }
        result
    }

    async fn fetch(&self, metadata_url: &Url) -> AuthResult<DiscoveryDocument> {
        let response = self
            .client
            .get(metadata_url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AuthError::discovery(format!("cannot reach '{}': {}", metadata_url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::discovery(format!("cannot read response from '{}': {}", metadata_url, e)))?;

        if !status.is_success() {
            return Err(AuthError::discovery(format!(
                "'{}' responded with status {}: {}",
                metadata_url,
                status.as_u16(),
                body
            )));
        }
        DiscoveryDocument::from_json(&body)
    }
}
