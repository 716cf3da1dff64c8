//! CLI command handling.
//!
//! Provides subcommands for:
//! - Executing a plan file (`run`)
//! - Inspecting tool services (`services list`, `services tools`)
//! - Producing encrypted credential records (`credential encrypt`)
//! - Classifying failure text (`classify`)

mod classify;
mod credential;
mod run;
mod services;

pub use classify::run_classify_command;
pub use credential::{CredentialCommand, run_credential_command};
pub use run::{RunArgs, run_plan_command};
pub use services::{ServicesCommand, run_services_command};

use std::path::PathBuf;

use clap::{ColorChoice, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "stepchain")]
#[command(about = "Execute multi-step tool plans against remote tool services")]
#[command(
    long_about = "stepchain runs planned tool calls in order, feeding each result into the next step.\nExamples:\n  stepchain run --plan plan.json --user alice\n  stepchain services tools github"
)]
#[command(version)]
#[command(color = ColorChoice::Auto)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Tool services file (TOML). Defaults to ~/.stepchain/services.toml
    #[arg(short, long, global = true)]
    pub services: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a plan and stream progress events as JSON lines
    #[command(
        about = "Execute a plan",
        long_about = "Runs every step of a plan file and prints one JSON progress event per line.\nExample: stepchain run --plan plan.json --user alice"
    )]
    Run(RunArgs),

    /// Inspect configured tool services
    #[command(
        subcommand,
        about = "Inspect tool services",
        long_about = "List configured services or discover the tools one offers.\nExample: stepchain services tools github"
    )]
    Services(ServicesCommand),

    /// Manage stored credential records
    #[command(
        subcommand,
        about = "Manage credentials",
        long_about = "Encrypt credential fields into a record the credential store accepts.\nExample: stepchain credential encrypt --user alice --service github GITHUB_TOKEN=ghp_xxx"
    )]
    Credential(CredentialCommand),

    /// Classify a failure message
    #[command(
        about = "Classify an error message",
        long_about = "Prints the structured classification of a failure message.\nExample: stepchain classify 'HTTP 401: token expired' --tool github"
    )]
    Classify {
        /// Failure text to classify
        message: String,

        /// Tool the failure came from (used in user-facing guidance)
        #[arg(long)]
        tool: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "stepchain", "run", "--plan", "plan.json", "--user", "alice", "--services", "s.toml",
        ]);
        assert_eq!(cli.services, Some(PathBuf::from("s.toml")));
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.plan, PathBuf::from("plan.json"));
                assert_eq!(args.user, "alice");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_credential_fields() {
        let cli = Cli::parse_from([
            "stepchain",
            "credential",
            "encrypt",
            "--user",
            "alice",
            "--service",
            "github",
            "GITHUB_TOKEN=abc=def",
        ]);
        match cli.command {
            Command::Credential(CredentialCommand::Encrypt { fields, .. }) => {
                assert_eq!(fields, vec![("GITHUB_TOKEN".to_string(), "abc=def".to_string())]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
