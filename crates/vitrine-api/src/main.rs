//! Vitrine entry point.
//!
//! Binary name: `vitrine`
//!
//! Parses CLI arguments, loads configuration, then either runs the bot
//! (`serve`) or one of the maintenance commands.

mod cli;
mod http;
mod state;

use std::process::ExitCode;

use clap::Parser;
use clap_complete::generate;
use vitrine_observe::{LogFormat, TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppContext;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Shell completions don't need config or logging
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "vitrine", &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_tracing(
        &TracingOptions::from_verbosity(cli.verbose, cli.quiet)
            .with_format(format)
            .with_otel(cli.otel),
    )
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let ctx = AppContext::init(cli.config).await?;

    match cli.command {
        Commands::Serve { device_label, port } => cli::serve::serve(ctx, device_label, port).await,

        Commands::Credentials { action } => {
            cli::credentials::run(&ctx, action, cli.json).await?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Config => {
            cli::config::show(&ctx, cli.json)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }
}
