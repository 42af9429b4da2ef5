//! Manual credential mirroring: `vitrine credentials pull|push|purge`.

use std::time::Duration;

use anyhow::Result;
use console::style;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::CredentialsAction;
use crate::state::{AppContext, ConcreteCredentialBridge};

pub async fn run(ctx: &AppContext, action: CredentialsAction, json: bool) -> Result<()> {
    let bridge = ctx.credential_bridge()?;
    if !bridge.store().is_enabled() && !json {
        println!(
            "  {} No remote store configured ([storage] backend = \"none\").",
            style("!").yellow().bold()
        );
    }

    match action {
        CredentialsAction::Pull => pull(&bridge, json).await,
        CredentialsAction::Push => push(&bridge, json).await,
        CredentialsAction::Purge { remote, force } => purge(&bridge, remote, force, json).await,
    }
}

async fn pull(bridge: &ConcreteCredentialBridge, json: bool) -> Result<()> {
    let spinner = spinner(json, "Downloading credentials...");
    let written = bridge.hydrate().await;
    spinner.finish_and_clear();
    let written = written?;

    if json {
        println!("{}", serde_json::json!({ "pulled": written }));
    } else {
        println!(
            "  {} {} credential file(s) written to {}",
            style("✓").green().bold(),
            written,
            bridge.local_dir().display()
        );
    }
    Ok(())
}

async fn push(bridge: &ConcreteCredentialBridge, json: bool) -> Result<()> {
    let spinner = spinner(json, "Uploading credentials...");
    let uploaded = bridge.mirror().await;
    spinner.finish_and_clear();
    let uploaded = uploaded?;

    if json {
        println!("{}", serde_json::json!({ "pushed": uploaded }));
    } else {
        println!(
            "  {} {} credential file(s) uploaded to the {} store",
            style("✓").green().bold(),
            uploaded,
            bridge.store().kind()
        );
    }
    Ok(())
}

async fn purge(
    bridge: &ConcreteCredentialBridge,
    remote: bool,
    force: bool,
    json: bool,
) -> Result<()> {
    if !force && !json {
        let scope = if remote { "local and remote" } else { "local" };
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete the {} credential set? The device will have to be linked again.",
                style(scope).red().bold()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    bridge.purge_local().await?;
    let remote_deleted = if remote {
        Some(bridge.purge_remote().await?)
    } else {
        None
    };

    if json {
        println!(
            "{}",
            serde_json::json!({ "purged_local": true, "purged_remote": remote_deleted })
        );
    } else {
        println!(
            "  {} Local credentials deleted from {}",
            style("✓").red().bold(),
            bridge.local_dir().display()
        );
        if let Some(count) = remote_deleted {
            println!(
                "  {} {} remote object(s) deleted",
                style("✓").red().bold(),
                count
            );
        }
    }
    Ok(())
}

fn spinner(json: bool, message: &'static str) -> ProgressBar {
    if json {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}
