use std::fmt;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::utils::constants::DEFAULT_TOKEN_EXPIRY_TOLERANCE_SECS;

/// ================================
/// SMART Backend Services client settings
/// ================================
///
/// Immutable once handed to the credential factory. Field names follow the
/// YAML config (`snake_case`); the camelCase names of the wider FHIR client
/// configuration are accepted as aliases.
#[derive(Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthSettings {
    pub enabled: bool,
    #[serde(alias = "useSMART", alias = "useSmart")]
    pub use_smart: bool,
    #[serde(alias = "tokenEndpoint")]
    pub token_endpoint: Option<String>,
    /// Explicit discovery document URL, fetched as-is instead of the well-known path.
    #[serde(alias = "smartMetadataUrl")]
    pub smart_metadata_url: Option<String>,
    #[serde(alias = "clientId")]
    pub client_id: Option<String>,
    #[serde(alias = "clientSecret")]
    pub client_secret: Option<String>,
    /// Private key in JWK form. Accepts a JSON string or an inline mapping.
    #[serde(alias = "privateKeyJWK", deserialize_with = "deserialize_jwk")]
    pub private_key_jwk: Option<String>,
    pub scope: Option<String>,
    /// Seconds subtracted from the server-reported lifetime.
    #[serde(alias = "tokenExpiryTolerance")]
    pub token_expiry_tolerance: u64,
    #[serde(alias = "useFormForBasicAuth")]
    pub use_form_for_basic_auth: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            use_smart: true,
            token_endpoint: None,
            smart_metadata_url: None,
            client_id: None,
            client_secret: None,
            private_key_jwk: None,
            scope: None,
            token_expiry_tolerance: DEFAULT_TOKEN_EXPIRY_TOLERANCE_SECS,
            use_form_for_basic_auth: false,
        }
    }
}

impl AuthSettings {
    /// Enabled settings authenticating with a shared secret.
    pub fn client_secret(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            enabled: true,
            client_id: Some(client_id.into()),
            client_secret: Some(client_secret.into()),
            ..Self::default()
        }
    }

    /// Enabled settings authenticating with a private-key JWT assertion.
    pub fn private_key(client_id: impl Into<String>, private_key_jwk: impl Into<String>) -> Self {
        Self {
            enabled: true,
            client_id: Some(client_id.into()),
            private_key_jwk: Some(private_key_jwk.into()),
            ..Self::default()
        }
    }

    /// Uses the given token endpoint and skips discovery.
    pub fn with_token_endpoint(mut self, token_endpoint: impl Into<String>) -> Self {
        self.token_endpoint = Some(token_endpoint.into());
        self.use_smart = false;
        self
    }

    pub fn with_smart_metadata_url(mut self, url: impl Into<String>) -> Self {
        self.smart_metadata_url = Some(url.into());
        self.use_smart = true;
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_token_expiry_tolerance(mut self, seconds: u64) -> Self {
        self.token_expiry_tolerance = seconds;
        self
    }

    pub fn with_form_for_basic_auth(mut self, use_form: bool) -> Self {
        self.use_form_for_basic_auth = use_form;
        self
    }

    /// Scope to request, `None` when unset or blank.
    pub fn effective_scope(&self) -> Option<&str> {
        self.scope.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn token_expiry_tolerance(&self) -> chrono::Duration {
        i64::try_from(self.token_expiry_tolerance)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

// secrets and key material never reach logs
impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("enabled", &self.enabled)
            .field("use_smart", &self.use_smart)
            .field("token_endpoint", &self.token_endpoint)
            .field("smart_metadata_url", &self.smart_metadata_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("private_key_jwk", &self.private_key_jwk.as_ref().map(|_| "***"))
            .field("scope", &self.scope)
            .field("token_expiry_tolerance", &self.token_expiry_tolerance)
            .field("use_form_for_basic_auth", &self.use_form_for_basic_auth)
            .finish()
    }
}

fn deserialize_jwk<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => Ok(Some(raw)),
        Some(inline @ Value::Object(_)) => Ok(Some(inline.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "private_key_jwk must be a JSON string or mapping, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_defaults_and_aliases() {
        let settings: AuthSettings = serde_yaml::from_str(
            r#"
enabled: true
useSMART: false
tokenEndpoint: https://auth.example.com/token
clientId: service
clientSecret: s3cret
"#,
        )
        .unwrap();

        assert!(settings.enabled);
        assert!(!settings.use_smart);
        assert_eq!(settings.token_endpoint.as_deref(), Some("https://auth.example.com/token"));
        assert_eq!(settings.token_expiry_tolerance, 120);
        assert!(!settings.use_form_for_basic_auth);
        assert_eq!(settings.effective_scope(), None);
    }

    #[test]
    fn inline_jwk_mapping_is_kept_as_json() {
        let settings: AuthSettings = serde_yaml::from_str(
            r#"
enabled: true
client_id: service
private_key_jwk:
  kty: EC
  crv: P-256
  d: abc
"#,
        )
        .unwrap();

        let jwk: Value = serde_json::from_str(settings.private_key_jwk.as_deref().unwrap()).unwrap();
        assert_eq!(jwk["kty"], "EC");
        assert_eq!(jwk["crv"], "P-256");
    }

    #[test]
    fn debug_redacts_secrets() {
        let settings = AuthSettings::client_secret("service", "s3cret");
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("***"));
    }
}
