//! Configuration validation with aggregated violations.
//! - Collects every issue instead of stopping at the first one
//! - Auth invariants:
//!   * client id required when enabled
//!   * exactly one of client secret / private key
//!   * explicit token endpoint required without SMART discovery
//!   * endpoints must be absolute http(s) URLs
//! - Service settings: retry bounds, logging level, server paths

use std::fmt;

use tracing::{error, info};
use url::Url;

use crate::config::auth::AuthSettings;
use crate::config::settings::{RetryConfig, SettingsConfig};
use crate::config::types::ServiceConfig;
use crate::error::{AuthError, AuthResult};

/// A single violated constraint: optional property path plus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: Option<String>,
    pub message: String,
}

impl Violation {
    pub fn new(path: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            path: path.map(str::to_owned),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.path.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(path) => write!(f, "{}: {}", path, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Accumulates violations through a fluent API.
#[derive(Debug, Default)]
pub struct ViolationAccumulator {
    prefix: Option<String>,
    violations: Vec<Violation>,
}

impl ViolationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Property paths get `prefix.` prepended, e.g. `auth.client_id`.
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: Some(prefix.to_owned()),
            violations: Vec::new(),
        }
    }

    pub fn check_that(&mut self, assertion: bool, message: &str, property: &str) -> &mut Self {
        if !assertion {
            self.add_violation(message, Some(property));
        }
        self
    }

    /// Object-level check with no property path.
    pub fn check(&mut self, assertion: bool, message: &str) -> &mut Self {
        if !assertion {
            self.add_violation(message, None);
        }
        self
    }

    pub fn add_violation(&mut self, message: &str, property: Option<&str>) -> &mut Self {
        let path = match (&self.prefix, property) {
            (Some(prefix), Some(property)) => Some(format!("{}.{}", prefix, property)),
            (Some(prefix), None) => Some(prefix.to_owned()),
            (None, property) => property.map(str::to_owned),
        };
        self.violations.push(Violation {
            path,
            message: message.to_owned(),
        });
        self
    }

    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn into_violations(self) -> Vec<Violation> {
        self.violations
    }
}

/// Renders violations as sorted `path: message` lines.
pub fn format_violations(violations: &[Violation]) -> String {
    let mut lines: Vec<String> = violations.iter().map(ToString::to_string).collect();
    lines.sort();
    lines.join("\n")
}

/// Fails with `AuthError::Configuration` when any violation is present.
pub fn fail_validation(violations: Vec<Violation>, title: Option<&str>) -> AuthResult<()> {
    if violations.is_empty() {
        return Ok(());
    }
    let formatted = format_violations(&violations);
    let message = match title {
        Some(title) => format!("{}\n{}", title, formatted),
        None => formatted,
    };
    Err(AuthError::Configuration {
        message,
        violations,
    })
}

pub fn ensure_valid(settings: &AuthSettings, title: &str) -> AuthResult<()> {
    fail_validation(validate_auth_settings(settings), Some(title))
}

/// AUTH VALIDATION
pub fn validate_auth_settings(settings: &AuthSettings) -> Vec<Violation> {
    let mut acc = ViolationAccumulator::new();
    check_auth_settings(settings, &mut acc);
    acc.into_violations()
}

fn check_auth_settings(settings: &AuthSettings, acc: &mut ViolationAccumulator) {
    if !settings.enabled {
        return;
    }

    let has_client_id = settings.client_id.as_deref().is_some_and(|id| !id.trim().is_empty());
    let has_secret = settings.client_secret.is_some();
    let has_key = settings.private_key_jwk.is_some();

    acc.check_that(has_client_id, "must be provided when auth is enabled", "client_id")
        .check(
            has_secret || has_key,
            "either client_secret or private_key_jwk must be provided when auth is enabled",
        )
        .check(
            !(has_secret && has_key),
            "only one of client_secret or private_key_jwk can be provided",
        )
        .check_that(
            settings.use_smart || settings.token_endpoint.is_some(),
            "must be provided when use_smart is false",
            "token_endpoint",
        );

    if let Some(endpoint) = &settings.token_endpoint {
        acc.check_that(is_http_url(endpoint), "must be an absolute http(s) URL", "token_endpoint");
    }
    if let Some(metadata_url) = &settings.smart_metadata_url {
        acc.check_that(
            is_http_url(metadata_url),
            "must be an absolute http(s) URL",
            "smart_metadata_url",
        );
    }
}

fn is_http_url(raw: &str) -> bool {
    Url::parse(raw.trim())
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}

/// Public entrypoint for a full config file: returns every issue found.
pub fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<Violation>> {
    let mut acc = ViolationAccumulator::with_prefix("settings");
    validate_settings(&cfg.settings, &mut acc);
    let mut violations = acc.into_violations();

    if !is_http_url(&cfg.fhir_endpoint) {
        violations.push(Violation::new(Some("fhir_endpoint"), "must be an absolute http(s) URL"));
    }

    let mut auth_acc = ViolationAccumulator::with_prefix("auth");
    check_auth_settings(&cfg.auth, &mut auth_acc);
    violations.extend(auth_acc.into_violations());

    if violations.is_empty() {
        info!("config valid");
        Ok(())
    } else {
        error!("configuration validation errors ({}):", violations.len());
        for v in &violations {
            error!(" - {}", v);
        }
        Err(violations)
    }
}

/// SETTINGS VALIDATION
fn validate_settings(settings: &SettingsConfig, acc: &mut ViolationAccumulator) {
    if let Some(retry) = &settings.retry {
        validate_retry(retry, acc);
    }

    acc.check_that(settings.http.timeout_ms > 0, "must be > 0", "http.timeout_ms")
        .check_that(!settings.server.host.is_empty(), "must be valid", "server.host")
        .check_that(
            settings.server.port.parse::<u16>().is_ok(),
            "must be a port number",
            "server.port",
        )
        .check_that(
            settings.server.token_path.starts_with('/'),
            "must start with '/'",
            "server.token_path",
        )
        .check_that(
            settings.metrics.path.starts_with('/'),
            "must start with '/'",
            "metrics.path",
        )
        .check_that(
            settings.metrics.path != settings.server.token_path,
            "must differ from server.token_path",
            "metrics.path",
        );

    if let Some(logging) = &settings.logging {
        let valid = ["trace", "debug", "info", "warn", "error"];
        acc.check_that(
            valid.contains(&logging.level.to_lowercase().as_str()),
            &format!("'{}' invalid; allowed: {:?}", logging.level, valid),
            "logging.level",
        );
    }
}

fn validate_retry(retry: &RetryConfig, acc: &mut ViolationAccumulator) {
    if let Some(attempts) = retry.attempts {
        acc.check_that(attempts > 0, "must be > 0", "retry.attempts");
    }
    if let (Some(base), Some(max)) = (retry.base_delay_ms, retry.max_delay_ms) {
        acc.check_that(
            max >= base,
            &format!("({}) must be >= base_delay_ms ({})", max, base),
            "retry.max_delay_ms",
        );
    }
}
