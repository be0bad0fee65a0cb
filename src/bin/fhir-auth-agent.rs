use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use fhir_auth_agent::provider::CredentialFactory;
use fhir_auth_agent::resilience::retry::RetrySettings;
use fhir_auth_agent::server;
use fhir_auth_agent::utils::config_loader;
use fhir_auth_agent::utils::logging::{self, LogLevel};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "fhir-auth-agent.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the current bearer token for the configured FHIR endpoint
    Token,
    /// Serve the current token and metrics over http until ctrl-c
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load YAML config, start logging
    // -------------------------------

    let args = Args::parse();
    let service_config = match config_loader::run(&args.config).await {
        Ok(cfg) => cfg,
        Err(e) => {
            logging::init_logging(&logging::resolve_logging_config(None, args.log_level));
            return Err(e);
        }
    };
    logging::init_logging(&logging::resolve_logging_config(
        Some(&service_config),
        args.log_level,
    ));

    // -------------------------------
    // 2. Create credentials
    // -------------------------------

    let timeout = Duration::from_millis(service_config.settings.http.timeout_ms);
    let factory = CredentialFactory::with_timeout(timeout)?;
    let provider = factory
        .create_credentials(&service_config.fhir_endpoint, &service_config.auth)
        .await
        .context("cannot create credentials")?;

    // -------------------------------
    // 3. Run the requested command
    // -------------------------------

    let result = match args.command {
        Command::Token => {
            let provider = provider
                .ok_or_else(|| anyhow!("authentication is disabled, no token to print"))?;
            let retry = RetrySettings::from(service_config.settings.retry.as_ref());
            let provider = &provider;
            retry
                .run_with_retry(move || provider.current_token())
                .await
                .map(|token| println!("{}", token))
                .map_err(anyhow::Error::from)
        }
        Command::Serve => {
            info!("service starting...");
            server::server::start(&service_config.settings, provider).await
        }
    };

    factory.close().await;
    result
}
