use crate::config::auth::AuthSettings;
use crate::config::settings::{LogFormat, LoggingConfig};
use crate::ServiceConfig;

pub fn initiate_default_values(mut config: ServiceConfig) -> ServiceConfig {
    if config.settings.logging.is_none() {
        config.settings.logging = Some(LoggingConfig::new("info".to_owned(), LogFormat::Compact));
    }
    config.fhir_endpoint = config.fhir_endpoint.trim().to_owned();
    config.auth = normalize_auth_settings(config.auth);
    config
}

/// Blank values come from unset `${VAR}` placeholders; treat them as absent.
pub fn normalize_auth_settings(mut auth: AuthSettings) -> AuthSettings {
    for field in [
        &mut auth.token_endpoint,
        &mut auth.smart_metadata_url,
        &mut auth.client_id,
        &mut auth.client_secret,
        &mut auth.private_key_jwk,
        &mut auth.scope,
    ] {
        blank_to_none(field);
    }
    auth
}

fn blank_to_none(value: &mut Option<String>) {
    if value.as_deref().map(str::trim).is_some_and(str::is_empty) {
        *value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_become_none() {
        let auth = AuthSettings {
            client_id: Some("svc".into()),
            client_secret: Some("  ".into()),
            private_key_jwk: Some("".into()),
            scope: Some("system/*.read".into()),
            ..AuthSettings::default()
        };

        let auth = normalize_auth_settings(auth);
        assert_eq!(auth.client_id.as_deref(), Some("svc"));
        assert_eq!(auth.client_secret, None);
        assert_eq!(auth.private_key_jwk, None);
        assert_eq!(auth.scope.as_deref(), Some("system/*.read"));
    }
}
