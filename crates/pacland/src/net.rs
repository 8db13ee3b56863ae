//! net — multicast socket plumbing for peer discovery.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use paclan_core::DiscoveryMessage;

use crate::discovery::AnnounceTransport;

/// Finds the IPv4 address this host would use to reach the discovery
/// group. No datagram is sent; connecting a UDP socket only asks the
/// kernel to pick a route and a source address.
pub fn local_ip(group: SocketAddrV4) -> Result<Ipv4Addr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").context("failed to bind probe socket")?;
    socket
        .connect(group)
        .context("failed to route toward the discovery group")?;
    match socket.local_addr().context("failed to read probe address")? {
        SocketAddr::V4(v4) if !v4.ip().is_unspecified() && !v4.ip().is_loopback() => Ok(*v4.ip()),
        other => bail!("no usable LAN address (kernel chose {other})"),
    }
}

/// Creates the socket the discovery loop receives on: bound to the group
/// port, joined to the group on every interface.
///
/// `SO_REUSEADDR` is set before binding so several processes on one host
/// can share the group port.
pub fn multicast_listener(group: Ipv4Addr, port: u16) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .context("failed to create discovery socket")?;
    socket
        .set_reuse_address(true)
        .context("failed to set SO_REUSEADDR")?;
    socket
        .set_nonblocking(true)
        .context("failed to set non-blocking mode")?;
    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket
        .bind(&SocketAddr::V4(bind_addr).into())
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    socket
        .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
        .with_context(|| format!("failed to join multicast group {group}"))?;
    UdpSocket::from_std(socket.into()).context("failed to register discovery socket with tokio")
}

/// Sends discovery datagrams to the multicast group.
pub struct MulticastSender {
    socket: Arc<UdpSocket>,
    dest: SocketAddrV4,
}

impl MulticastSender {
    pub fn new(dest: SocketAddrV4) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .context("failed to create announce socket")?;
        // TTL 1: never routed off this segment. Loopback on: listeners on
        // this host receive our datagrams too.
        socket
            .set_multicast_ttl_v4(1)
            .context("failed to set multicast TTL")?;
        socket
            .set_multicast_loop_v4(true)
            .context("failed to enable multicast loopback")?;
        socket
            .set_nonblocking(true)
            .context("failed to set non-blocking mode")?;
        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
        socket
            .bind(&SocketAddr::V4(bind_addr).into())
            .context("failed to bind announce socket")?;
        let socket = UdpSocket::from_std(socket.into())
            .context("failed to register announce socket with tokio")?;
        Ok(Self {
            socket: Arc::new(socket),
            dest,
        })
    }
}

impl AnnounceTransport for MulticastSender {
    fn send(&self, message: DiscoveryMessage) -> BoxFuture<'static, std::io::Result<()>> {
        let socket = Arc::clone(&self.socket);
        let dest = self.dest;
        async move {
            socket
                .send_to(message.encode().as_bytes(), SocketAddr::V4(dest))
                .await
                .map(|_| ())
        }
        .boxed()
    }
}
