//! pacland — LAN pacman cache daemon.
//!
//! Announces this host's package cache over multicast, learns about other
//! caches the same way, and serves one HTTP port with two faces: pacman on
//! this host gets packages fetched from peers, peers get packages from the
//! local cache. Run with no arguments to start the daemon, or with
//! `mirrorlist` to point pacman at it.

use std::net::SocketAddrV4;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use paclan_core::config::PaclanConfig;
use paclan_proxy::ProxyState;
use paclan_services::{PackageCache, PeerRegistry};

use pacland::discovery::Discovery;
use pacland::mirrorlist;
use pacland::net::{self, MulticastSender};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = PaclanConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = PaclanConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        PaclanConfig::default()
    });

    match std::env::args().nth(1).as_deref() {
        None => run_daemon(config).await,
        Some("mirrorlist") => run_mirrorlist(&config),
        Some(other) => {
            anyhow::bail!("unknown mode '{other}' (run with no argument, or 'mirrorlist')")
        }
    }
}

async fn run_daemon(config: PaclanConfig) -> Result<()> {
    let http_port = config.network.http_port;
    tracing::info!(http_port, "pacland starting");

    // Package cache
    let cache = PackageCache::new(&config.cache.root);
    tracing::info!(root = %config.cache.root.display(), "package cache ready");

    // Work out the address peers should reach us on
    let group = SocketAddrV4::new(config.network.multicast_group, config.network.discovery_port);
    let local_ip = match net::local_ip(group) {
        Ok(ip) => {
            tracing::info!(addr = %ip, "local address");
            Some(ip)
        }
        Err(e) => {
            tracing::error!(error = %e, "cannot resolve a LAN address; discovery disabled, serving cache only");
            None
        }
    };
    let registry = PeerRegistry::new(local_ip);

    // Discovery
    if let Some(ip) = local_ip {
        match start_discovery(&config, ip, registry.clone()) {
            Ok(discovery) => {
                discovery.probe().await;
                discovery
                    .settled(Duration::from_secs(config.network.settle_window_secs))
                    .await;
                tracing::info!(peers = registry.len(), "discovery settled");
            }
            Err(e) => {
                tracing::error!(error = %e, "discovery startup failed; serving cache only")
            }
        }
    }

    // HTTP cache surface
    let state = ProxyState::new(
        registry,
        cache,
        Duration::from_secs(config.network.peer_timeout_secs),
    )?;
    paclan_proxy::serve(state, http_port, shutdown_signal()).await
}

/// Join the group, then keep listening and announcing in the background.
fn start_discovery(
    config: &PaclanConfig,
    local_ip: std::net::Ipv4Addr,
    registry: PeerRegistry,
) -> Result<Arc<Discovery<MulticastSender>>> {
    let group = config.network.multicast_group;
    let port = config.network.discovery_port;

    let listener = net::multicast_listener(group, port)
        .context("failed to join the discovery group")?;
    let sender = MulticastSender::new(SocketAddrV4::new(group, port))
        .context("failed to create announce socket")?;

    let self_addr = SocketAddrV4::new(local_ip, config.network.http_port);
    let discovery = Arc::new(Discovery::new(registry, sender, self_addr));

    {
        let discovery = discovery.clone();
        tokio::spawn(async move { discovery.listen(listener).await });
    }
    {
        let discovery = discovery.clone();
        let every = Duration::from_secs(config.network.announce_interval_secs);
        tokio::spawn(async move { discovery.announce_loop(every).await });
    }

    Ok(discovery)
}

fn run_mirrorlist(config: &PaclanConfig) -> Result<()> {
    let path = &config.mirrorlist.path;
    if mirrorlist::ensure_preferred(path, config.network.http_port)? {
        tracing::info!(path = %path.display(), "mirrorlist now prefers the local cache");
    } else {
        tracing::info!(path = %path.display(), "mirrorlist already prefers the local cache");
    }
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(e) => {
            tracing::warn!(error = %e, "failed to listen for shutdown signal");
            // Without a signal stream the daemon just runs until killed.
            std::future::pending::<()>().await;
        }
    }
}
