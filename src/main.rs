//! UniswapV2 Liquidity Watcher
//!
//! Polls the account's LP positions, values them in a chosen currency,
//! reports significant moves and pulls liquidity when a position drops
//! past the configured threshold.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use watcher_chain::UniswapV2Client;
use watcher_core::config::WatcherConfig;
use watcher_core::{PositionRegistry, Watcher, WatcherSettings};

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,watcher_core=debug,watcher_chain=debug")),
        )
        .init();

    let config = WatcherConfig::from_env()?;
    config.validate()?;
    config.log_config();

    info!("Connecting to chain...");
    let client = Arc::new(
        UniswapV2Client::connect(config.client_config())
            .await
            .context("connecting chain client")?,
    );

    let registry = PositionRegistry::load(&config.registry_path)
        .with_context(|| format!("loading registry {}", config.registry_path.display()))?;

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), shutdown.clone()));

    let mut watcher = Watcher::new(
        client,
        WatcherSettings::from_config(&config),
        registry,
        shutdown,
    );

    info!("Bootstrapping...");
    watcher.bootstrap().await?;

    info!("Starting poll loop...");
    watcher.run().await?;

    Ok(())
}

/// Cancel `shutdown` once `signal` fires. If the signal cannot be listened
/// for, the token is left alone and the watcher keeps running.
async fn cancel_on_signal<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!(error = %e, "Could not listen for Ctrl+C, shutdown signal disabled");
        return;
    }
    info!("Ctrl+C received, finishing current position");
    shutdown.cancel();
}

fn print_banner() {
    println!(r#"
    ╦  ┬┌─┐ ┬ ┬┬┌┬┐┬┌┬┐┬ ┬  ╦ ╦┌─┐┌┬┐┌─┐┬ ┬┌─┐┬─┐
    ║  ││─┼┐│ ││ │││ │ └┬┘  ║║║├─┤ │ │  ├─┤├┤ ├┬┘
    ╩═╝┴└─┘└└─┘┴─┴┘┴ ┴  ┴   ╚╩╝┴ ┴ ┴ └─┘┴ ┴└─┘┴└─
    UniswapV2 Liquidity Watcher v0.1.0
    "#);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_cancels_token() {
        let shutdown = CancellationToken::new();
        cancel_on_signal(async { Ok::<(), std::io::Error>(()) }, shutdown.clone()).await;
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_failed_signal_registration_keeps_running() {
        let shutdown = CancellationToken::new();
        let unavailable = async { Err::<(), _>(std::io::Error::other("no signal driver")) };
        cancel_on_signal(unavailable, shutdown.clone()).await;
        assert!(!shutdown.is_cancelled());
    }
}
