mod app;
mod config;
mod domain;
mod irc;
mod logging;
mod publish;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::app::Session;
use crate::config::AppConfig;
use crate::irc::connection;
use crate::publish::{JsonlPublisher, Relay};

#[tokio::main]
async fn main() -> Result<()> {
    let path = config::config_path(std::env::args_os().nth(1).map(PathBuf::from));
    let cfg = config::load_config(&path)?;
    logging::init(&cfg.logging)?;
    info!(config = %path.display(), nick = %cfg.bot.name, "starting");

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("shutdown requested");
            shutdown.cancel();
        });
    }

    if let Err(e) = run(cfg, shutdown).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cfg: AppConfig, shutdown: CancellationToken) -> Result<()> {
    // The connection outlives the shutdown signal so channels can be parted.
    let connection_token = CancellationToken::new();
    let (client, inbound) = tokio::select! {
        _ = shutdown.cancelled() => return Ok(()),
        connected = connection::connect(&cfg.irc, &connection_token) => connected?,
    };

    let session = Arc::new(Session::new(client.clone(), cfg.bot.name.clone()));
    let dispatcher = {
        let session = Arc::clone(&session);
        let mut relay = Relay::new(JsonlPublisher::new(&cfg.publish));
        tokio::spawn(async move { session.run(inbound, &mut relay).await })
    };

    let result = serve(&session, &cfg, &shutdown).await;

    let joined = session.channels();
    if !client.is_closed() && !joined.is_empty() {
        if let Err(e) = session.leave_channels(&joined).await {
            warn!(error = %e, "failed to part channels");
        }
    }
    client.close();
    client.done().await;
    if let Err(e) = dispatcher.await {
        warn!(error = %e, "dispatch task failed");
    }
    info!("stopped");
    result
}

async fn serve(session: &Session, cfg: &AppConfig, shutdown: &CancellationToken) -> Result<()> {
    session
        .login(&cfg.bot.oauth, cfg.irc.login_timeout(), shutdown)
        .await
        .context("Login failed")?;
    session
        .request_capabilities(&cfg.bot.capabilities)
        .await
        .context("Failed to request capabilities")?;
    session
        .join_channels(&cfg.bot.channels)
        .await
        .context("Failed to join channels")?;
    info!(channels = ?cfg.bot.channels, "running");

    let client = session.client();
    tokio::select! {
        _ = shutdown.cancelled() => return Ok(()),
        _ = client.done() => {}
    }
    match client.err() {
        Some(e) => Err(e).context("Connection lost"),
        None => Ok(()),
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut terminate) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
            return;
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
