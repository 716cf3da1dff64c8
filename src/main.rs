//! stepchain - command-line entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use stepchain::{
    cli::{
        Cli, Command, run_classify_command, run_credential_command, run_plan_command,
        run_services_command,
    },
    config::{Config, ServicesConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing();

    let mut config = Config::from_env()?;
    if let Some(path) = &cli.services {
        config.services = ServicesConfig::load_from(path)?;
    }

    match cli.command {
        Command::Run(args) => {
            let success = run_plan_command(args, &config).await?;
            Ok(if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Services(cmd) => {
            run_services_command(cmd, &config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Credential(cmd) => {
            run_credential_command(cmd, &config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Classify { message, tool } => {
            run_classify_command(&message, tool.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Logs go to stderr; stdout carries command output.
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stepchain=info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
