use clap::ValueEnum;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::settings::{LogFormat, LoggingConfig};
use crate::ServiceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match *self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Logging config from the file, with the CLI level taking precedence.
pub fn resolve_logging_config(
    service_config: Option<&ServiceConfig>,
    arg_log_level: Option<LogLevel>,
) -> LoggingConfig {
    let configured = service_config.and_then(|cfg| cfg.settings.logging.as_ref());
    let format = configured
        .map(|cfg| cfg.format.clone())
        .unwrap_or_else(LogFormat::from_env);
    let level = arg_log_level
        .map(|level| level.as_str().to_owned())
        .or_else(|| configured.map(|cfg| cfg.level.clone()))
        .unwrap_or_else(|| LogLevel::Info.as_str().to_owned());

    LoggingConfig::new(level, format)
}

/// Initialize tracing with the desired config. Later calls are no-ops.
pub fn init_logging(cfg: &LoggingConfig) {
    let env_filter = EnvFilter::try_new(&cfg.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    match cfg.format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_timer(UtcTime::rfc_3339())
                .flatten_event(true)
                .with_ansi(false);

            let _ = registry.with(layer).try_init();
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_timer(UtcTime::rfc_3339())
                .with_writer(std::io::stderr)
                .with_ansi(true);

            let _ = registry.with(layer).try_init();
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::auth::AuthSettings;
    use crate::config::settings::SettingsConfig;

    fn service_config(logging: Option<LoggingConfig>) -> ServiceConfig {
        ServiceConfig {
            settings: SettingsConfig {
                logging,
                ..SettingsConfig::default()
            },
            fhir_endpoint: "https://fhir.example.com/r4".to_owned(),
            auth: AuthSettings::default(),
        }
    }

    #[test]
    fn cli_level_overrides_file_level() {
        let cfg = service_config(Some(LoggingConfig::new("warn".into(), LogFormat::Json)));

        let resolved = resolve_logging_config(Some(&cfg), Some(LogLevel::Debug));
        assert_eq!(resolved.level, "debug");
        assert_eq!(resolved.format, LogFormat::Json);

        let resolved = resolve_logging_config(Some(&cfg), None);
        assert_eq!(resolved.level, "warn");
    }

    #[test]
    fn defaults_to_info() {
        let resolved = resolve_logging_config(Some(&service_config(None)), None);
        assert_eq!(resolved.level, "info");
    }
}
