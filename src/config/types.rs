use serde::Deserialize;

use crate::config::auth::AuthSettings;
use crate::config::settings::SettingsConfig;

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
    /// FHIR base endpoint the credentials are created for.
    pub fhir_endpoint: String,
    #[serde(default)]
    pub auth: AuthSettings,
}
