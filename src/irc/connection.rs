//! Dialing the chat service.
//!
//! [`connect`] opens TCP (and TLS when configured), wraps the stream in a
//! [`Client`] with its decode flow running, and waits a short settle period.
//! A connection the service drops within that window is retried according
//! to [`RetryConfig`](crate::config::RetryConfig).

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::client::{Client, Inbound};
use crate::config::IrcConfig;

pub async fn connect(config: &IrcConfig, cancel: &CancellationToken) -> Result<(Client, Inbound)> {
    let attempts = config.retry.attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            bail!("cancelled before connecting to {}", config.address);
        }
        match try_connect(config, cancel).await {
            Ok(connected) => {
                info!(address = %config.address, attempt, "connected");
                return Ok(connected);
            }
            Err(e) => {
                warn!(address = %config.address, attempt, attempts, error = %e, "connection attempt failed");
                last_err = Some(e);
            }
        }

        if attempt < attempts {
            tokio::select! {
                _ = cancel.cancelled() => bail!("cancelled while connecting to {}", config.address),
                _ = tokio::time::sleep(config.retry.delay()) => {}
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("no connection attempt made")))
        .with_context(|| format!("Failed to connect to {} after {} attempts", config.address, attempts))
}

async fn try_connect(config: &IrcConfig, cancel: &CancellationToken) -> Result<(Client, Inbound)> {
    let tcp = TcpStream::connect(&config.address)
        .await
        .with_context(|| format!("Failed to dial {}", config.address))?;
    tcp.set_nodelay(true)?;

    let (client, inbound) = if config.tls {
        let tls = upgrade_to_tls(tcp, config.host()).await?;
        Client::new(tls, cancel.child_token())
    } else {
        Client::new(tcp, cancel.child_token())
    };
    client.spawn();

    tokio::time::sleep(config.retry.delay()).await;
    if client.is_done() {
        let reason = client
            .err()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "closed".to_string());
        bail!("connection dropped right after connecting: {}", reason);
    }
    Ok((client, inbound))
}

async fn upgrade_to_tls(
    tcp: TcpStream,
    host: &str,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let mut roots = RootCertStore::empty();
    let certs = rustls_native_certs::load_native_certs();
    for cert in certs.certs {
        if let Err(e) = roots.add(cert) {
            warn!("Failed to add root cert: {}", e);
        }
    }
    for e in &certs.errors {
        warn!("Error loading native certs: {}", e);
    }

    let tls_config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(tls_config));
    let server_name = ServerName::try_from(host.to_string())
        .with_context(|| format!("Invalid TLS server name {}", host))?;

    connector
        .connect(server_name, tcp)
        .await
        .with_context(|| format!("TLS handshake with {} failed", host))
}
