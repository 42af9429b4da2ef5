//! `vitrine config`: print the effective configuration.

use anyhow::Result;
use console::style;

use crate::state::AppContext;

pub fn show(ctx: &AppContext, json: bool) -> Result<()> {
    let secrets = serde_json::json!({
        "storage_sas_token": ctx.secrets.storage_sas_token.is_some(),
        "webhook_secret": ctx.secrets.webhook_secret.is_some(),
    });

    if json {
        let out = serde_json::json!({
            "config_path": ctx.config_path.display().to_string(),
            "data_dir": ctx.data_dir.display().to_string(),
            "auth_dir": ctx.auth_dir().display().to_string(),
            "secrets_set": secrets,
            "config": ctx.config,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        style("Config").bold(),
        style(ctx.config_path.display()).cyan()
    );
    println!("  {} {}", style("Data").bold(), ctx.data_dir.display());
    println!("  {} {}", style("Auth").bold(), ctx.auth_dir().display());
    println!(
        "  {} SAS token {}, webhook secret {}",
        style("Secrets").bold(),
        set_or_unset(ctx.secrets.storage_sas_token.is_some()),
        set_or_unset(ctx.secrets.webhook_secret.is_some()),
    );
    println!();
    println!("{}", toml::to_string_pretty(&ctx.config)?);
    Ok(())
}

fn set_or_unset(set: bool) -> console::StyledObject<&'static str> {
    if set {
        style("set").green()
    } else {
        style("unset").dim()
    }
}
