//! CLI command definitions for the `vitrine` binary.

pub mod config;
pub mod credentials;
pub mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Keep a storefront chat bot connected and answering.
#[derive(Parser)]
#[command(name = "vitrine", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Config file. Defaults to `vitrine.toml` in the data directory.
    #[arg(long, global = true, env = "VITRINE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the session supervisor and the status server.
    Serve {
        /// Label announced for the linked device.
        #[arg(long)]
        device_label: Option<String>,

        /// Port for the status server (overrides config and PORT).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Move the credential set between the local directory and the
    /// remote store.
    Credentials {
        #[command(subcommand)]
        action: CredentialsAction,
    },

    /// Print the effective configuration.
    Config,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum CredentialsAction {
    /// Download the remote credential set into the local directory.
    Pull,

    /// Upload the local credential set to the remote store.
    Push,

    /// Delete the local credential set; a new scan will be required.
    Purge {
        /// Delete the remote copy as well.
        #[arg(long)]
        remote: bool,

        /// Do not ask for confirmation.
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_serve_overrides() {
        let cli = Cli::try_parse_from([
            "vitrine",
            "-v",
            "serve",
            "--device-label",
            "Loja Centro",
            "--port",
            "8080",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Serve { device_label, port } => {
                assert_eq!(device_label.as_deref(), Some("Loja Centro"));
                assert_eq!(port, Some(8080));
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn parses_credentials_purge() {
        let cli =
            Cli::try_parse_from(["vitrine", "credentials", "purge", "--remote", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Credentials {
                action: CredentialsAction::Purge {
                    remote: true,
                    force: true
                }
            }
        ));
    }
}
