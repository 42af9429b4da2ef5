//! `vitrine serve`: the long-running bot process.
//!
//! Wires the sidecar transport, credential bridge and command router into a
//! [`SessionSupervisor`], serves the status pages next to it, and decides
//! the process exit code from how the supervisor stopped.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use console::style;
use secrecy::SecretString;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vitrine_core::command::{
    BoxCommandHandler, CommandRouter, CommandTable, GroupReadinessCache, storefront_table,
};
use vitrine_core::session::{ConnectOptions, Outbox, ReconnectPolicy, SessionSupervisor};
use vitrine_infra::bridge::SidecarTransport;
use vitrine_infra::webhook::WebhookCommandHandler;
use vitrine_types::config::CommandsConfig;
use vitrine_types::session::StatusSnapshot;

use crate::http::router::build_router;
use crate::state::{AppContext, AppState};

/// Pause before exiting with failure so the last log lines get out.
const FAILURE_EXIT_DELAY: Duration = Duration::from_secs(2);

pub async fn serve(
    ctx: AppContext,
    device_label: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<ExitCode> {
    let config = &ctx.config;
    let device_label = device_label.unwrap_or_else(|| config.session.device_label.clone());
    let port = port.unwrap_or(config.http.port);

    let credentials = Arc::new(ctx.credential_bridge()?);
    info!(
        backend = credentials.store().kind(),
        auth_dir = %credentials.local_dir().display(),
        "credential store ready"
    );

    let router = Arc::new(build_command_router(
        &config.commands,
        GroupReadinessCache::from(&config.readiness),
        ctx.secrets.webhook_secret.clone(),
    )?);

    let shutdown = CancellationToken::new();
    let supervisor = SessionSupervisor::new(
        SidecarTransport::new(config.bridge.clone()),
        credentials,
        router,
        ConnectOptions {
            device_label: device_label.clone(),
            auth_dir: ctx.auth_dir(),
        },
    )
    .with_policy(ReconnectPolicy::from(&config.reconnect))
    .with_dispatch(config.commands.dispatch, config.commands.workers)
    .with_purge_remote_on_logout(config.storage.purge_remote_on_logout)
    .with_shutdown(shutdown.clone());

    let status = supervisor.subscribe();
    let supervisor_task = tokio::spawn(async move { supervisor.run().await });

    let addr = format!("{}:{}", config.http.host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind status server to {addr}"))?;

    println!(
        "  {} Vitrine status on {}",
        style("⚡").bold(),
        style(format!("http://{addr}")).cyan()
    );
    println!("  {}", style("Press Ctrl+C to stop").dim());

    tokio::spawn(announce_scan_codes(status.clone(), shutdown.clone()));
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            tokio::select! {
                _ = shutdown_signal() => {
                    info!("shutdown signal received");
                    shutdown.cancel();
                }
                _ = shutdown.cancelled() => {}
            }
        }
    });

    let app = build_router(AppState::new(status, device_label));
    let server = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        }
    });

    let failed = match supervisor_task.await {
        Ok(Ok(())) => false,
        Ok(Err(e)) => {
            error!(error = %e, "session supervisor gave up, exiting");
            true
        }
        Err(e) => {
            error!(error = %e, "session supervisor crashed, exiting");
            true
        }
    };

    shutdown.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "status server stopped with an error"),
        Err(e) => warn!(error = %e, "status server task failed"),
    }

    if failed {
        tokio::time::sleep(FAILURE_EXIT_DELAY).await;
        return Ok(ExitCode::FAILURE);
    }
    println!("\n  Stopped.");
    Ok(ExitCode::SUCCESS)
}

/// Build the router: every storefront command is served by the webhook.
///
/// Without a webhook URL the table is empty and the bot only keeps the
/// session alive.
pub fn build_command_router(
    commands: &CommandsConfig,
    readiness: GroupReadinessCache,
    webhook_secret: Option<SecretString>,
) -> anyhow::Result<CommandRouter> {
    let outbox = Outbox::new();
    let Some(url) = commands.webhook_url.as_deref() else {
        warn!("commands.webhook_url is not set, commands will not be answered");
        return Ok(CommandRouter::new(CommandTable::new(), outbox)
            .with_readiness(readiness)
            .with_error_reply(commands.error_reply.clone()));
    };

    let webhook = WebhookCommandHandler::new(
        url,
        Duration::from_secs(commands.timeout_secs),
        webhook_secret,
    )?;
    info!(url = %webhook.url(), "forwarding commands to webhook");

    let table = storefront_table(|_| BoxCommandHandler::new(webhook.clone()));
    let mut router = CommandRouter::new(table, outbox)
        .with_readiness(readiness)
        .with_error_reply(commands.error_reply.clone());
    if commands.abuse_scan {
        router = router.with_abuse_scan(BoxCommandHandler::new(webhook.clone()));
    }
    if commands.receipt_images {
        router = router.with_receipt_handler(BoxCommandHandler::new(webhook));
    }
    Ok(router)
}

/// Print each new scan code so an operator can link the device from the
/// terminal.
async fn announce_scan_codes(
    mut status: watch::Receiver<StatusSnapshot>,
    shutdown: CancellationToken,
) {
    let mut last: Option<String> = None;
    loop {
        let code = status.borrow_and_update().scan_code.clone();
        if code != last
            && let Some(code) = &code
        {
            println!(
                "\n  {} Link the device by scanning this code (also shown on the status page):\n\n  {}\n",
                style("📱").bold(),
                style(code).yellow().bold()
            );
        }
        last = code;

        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = shutdown.cancelled() => return,
        }
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use vitrine_core::command::StorefrontCommand;

    use super::*;

    #[test]
    fn without_webhook_no_commands_are_routed() {
        let router = build_command_router(
            &CommandsConfig::default(),
            GroupReadinessCache::default(),
            None,
        )
        .unwrap();
        assert!(router.table().is_empty());
    }

    #[test]
    fn webhook_serves_every_storefront_command() {
        let commands = CommandsConfig {
            webhook_url: Some("http://127.0.0.1:9/commands".to_string()),
            ..CommandsConfig::default()
        };
        let router = build_command_router(
            &commands,
            GroupReadinessCache::new(Duration::from_secs(5)),
            Some(SecretString::from("s3cret".to_string())),
        )
        .unwrap();

        assert_eq!(router.table().len(), StorefrontCommand::ORDERED.len());
        assert_eq!(router.readiness().cooldown(), Duration::from_secs(5));
    }

    #[test]
    fn invalid_webhook_url_is_rejected() {
        let commands = CommandsConfig {
            webhook_url: Some("not a url".to_string()),
            ..CommandsConfig::default()
        };
        assert!(
            build_command_router(&commands, GroupReadinessCache::default(), None).is_err()
        );
    }
}
