use std::path::Path;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use regex::Regex;
use tracing::{debug, error};

use crate::config::proc_initiateor::initiate_default_values;
use crate::config::proc_validator::{self, format_violations};
use crate::config::types::ServiceConfig;
use crate::observability::metrics::get_metrics;

/// Load and validate config from YAML file
pub async fn file_to_config(path: &Path) -> Result<ServiceConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow!("cannot read config '{}': {}", path.display(), e))?;

    let expanded = expand_env_vars(&content);
    parse_config(expanded).await
}

pub async fn parse_config(content: String) -> Result<ServiceConfig> {
    let metrics = get_metrics().await;
    let service_config: ServiceConfig = serde_yaml::from_str(&content).inspect_err(|e| {
        error!("parse config error: {}", e);
        metrics.config_validation_errors.inc();
    })?;

    let service_config = initiate_default_values(service_config);
    debug!("validation config ...");
    proc_validator::validate_service_config(&service_config).map_err(|violations| {
        metrics.config_validation_errors.inc();
        anyhow!(
            "config is not valid, total errors: {}\n{}",
            violations.len(),
            format_violations(&violations)
        )
    })?;

    Ok(service_config)
}

/// Replaces `${VAR}` and `${VAR:default}` with environment values.
pub fn expand_env_vars(input: &str) -> String {
    static ENV_VAR: OnceLock<Regex> = OnceLock::new();
    let re = ENV_VAR.get_or_init(|| {
        Regex::new(r"\$\{(\w+)(?::([^\}]*))?\}").expect("env placeholder pattern is valid")
    });
    re.replace_all(input, |caps: &regex::Captures| {
        let var = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn expands_env_vars_with_defaults() {
        std::env::set_var("FHIR_AUTH_TEST_CLIENT", "svc-from-env");
        std::env::remove_var("FHIR_AUTH_TEST_MISSING");

        let expanded = expand_env_vars(
            "client_id: ${FHIR_AUTH_TEST_CLIENT}\nscope: ${FHIR_AUTH_TEST_MISSING:system/*.read}\nsecret: ${FHIR_AUTH_TEST_MISSING}",
        );

        assert_eq!(
            expanded,
            "client_id: svc-from-env\nscope: system/*.read\nsecret: "
        );
        std::env::remove_var("FHIR_AUTH_TEST_CLIENT");
    }

    #[tokio::test]
    #[serial]
    async fn loads_config_file_with_defaults() {
        std::env::set_var("FHIR_AUTH_TEST_SECRET", "s3cret");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
fhir_endpoint: https://fhir.example.com/r4
auth:
  enabled: true
  use_smart: false
  token_endpoint: https://auth.example.com/token
  client_id: service
  client_secret: ${{FHIR_AUTH_TEST_SECRET}}
  private_key_jwk: ${{FHIR_AUTH_TEST_UNSET_JWK}}
  scope: system/*.read
"#
        )
        .unwrap();

        let cfg = file_to_config(file.path()).await.unwrap();
        std::env::remove_var("FHIR_AUTH_TEST_SECRET");

        assert_eq!(cfg.fhir_endpoint, "https://fhir.example.com/r4");
        assert_eq!(cfg.auth.client_secret.as_deref(), Some("s3cret"));
        assert_eq!(cfg.auth.private_key_jwk, None);
        assert_eq!(cfg.auth.token_expiry_tolerance, 120);
        assert_eq!(cfg.settings.http.timeout_ms, 5000);
        assert_eq!(cfg.settings.server.token_path, "/token");
        assert_eq!(cfg.settings.logging.unwrap().level, "info");
    }

    #[tokio::test]
    async fn invalid_config_reports_all_errors() {
        let invalid_yaml = r#"
settings:
  retry:
    attempts: 0
  logging:
    level: loud
    format: compact
fhir_endpoint: not-a-url
auth:
  enabled: true
  use_smart: false
"#;
        let err = parse_config(invalid_yaml.to_string()).await.unwrap_err().to_string();

        assert!(err.contains("config is not valid"));
        assert!(err.contains("settings.retry.attempts"));
        assert!(err.contains("settings.logging.level"));
        assert!(err.contains("fhir_endpoint"));
        assert!(err.contains("auth.client_id"));
        assert!(err.contains("auth.token_endpoint"));
    }
}
