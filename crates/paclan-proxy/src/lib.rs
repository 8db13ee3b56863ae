//! paclan-proxy — the HTTP surface every paclan node exposes on the LAN.
//!
//! A single catch-all GET route serves two audiences with opposite answers:
//! the local pacman gets the peer walk, remote peers get the local cache.
//! Classification needs the caller's address, so the app must be served
//! with connect info; [`serve`] does that.

pub mod handlers;

use std::future::Future;
use std::net::SocketAddr;

use axum::routing::get;
use axum::Router;

pub use handlers::ProxyState;

/// Build the router. Every path is a package path.
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/{*path}", get(handlers::handle_package))
        .with_state(state)
}

/// Serve the cache surface on all interfaces until `shutdown` resolves.
/// Peers fetch from this port, so it cannot bind loopback only.
pub async fn serve(
    state: ProxyState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!(port, "cache surface listening on 0.0.0.0");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}
