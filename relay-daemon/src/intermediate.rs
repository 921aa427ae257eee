//! Intermediate mode: a next hop is configured. Runs a SOCKS5 accept loop
//! (and, optionally, a SOCKS5 UDP listener and an HTTP CONNECT front-end),
//! all dialing out through a [`NextHopPool`] that picks a next hop uniformly
//! at random per connection. Grounded in
//! `original_source/relayer/relayer.go`'s intermediate accept loop.

use std::net::SocketAddr;
use std::sync::Arc;

use relay_core::error::{Error, Result};
use relay_socks5::{Dialer, Server as Socks5Server};
use tokio::net::{TcpListener, UdpSocket};
use tracing::{debug, warn};

use crate::next_hop::{NextHopPool, PoolDialer};

/// Runs the SOCKS5 TCP accept loop forever. Each connection is served on
/// its own task so one slow client can't stall new accepts.
async fn run_socks5_tcp(listen: &str, server: Arc<Socks5Server>) -> Result<()> {
    let listener = TcpListener::bind(listen).await.map_err(Error::Io)?;
    debug!(listen, "relay-daemon: SOCKS5 listening");
    loop {
        let (sock, peer) = listener.accept().await.map_err(Error::Io)?;
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            if let Err(e) = server.serve(Box::new(sock)).await {
                debug!(peer = %peer, error = %e, "relay-daemon: SOCKS5 session ended");
            }
        });
    }
}

/// Runs the SOCKS5 UDP listener forever: every inbound datagram is handed to
/// [`Socks5Server::serve_udp`] on its own task, matching the "each
/// UDP-per-message relay spawns one task each" model spec.md §5 describes.
async fn run_socks5_udp(listen: &str, server: Arc<Socks5Server>) -> Result<()> {
    let socket = Arc::new(UdpSocket::bind(listen).await.map_err(Error::Io)?);
    debug!(listen, "relay-daemon: SOCKS5 UDP listening");
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let (n, peer) = socket.recv_from(&mut buf).await.map_err(Error::Io)?;
        let datagram = buf[..n].to_vec();
        let server = Arc::clone(&server);
        let socket = Arc::clone(&socket);
        tokio::spawn(async move {
            if let Err(e) = server.serve_udp(&socket, peer, &datagram).await {
                warn!(peer = %peer, error = %e, "relay-daemon: SOCKS5 UDP session ended");
            }
        });
    }
}

/// Runs every front-end this intermediate hop is configured with, returning
/// only if the mandatory SOCKS5 TCP listener itself fails (the UDP listener
/// and HTTP CONNECT front-end are optional; their failure is logged, not
/// fatal to the whole process).
pub async fn run(cfg: &relay_core::RelayConfig) -> Result<()> {
    let protocol_factory = crate::protocol::protocol_factory(&cfg.protocol);
    let pool = Arc::new(NextHopPool::new(&cfg.next, cfg.num_udp_mux, protocol_factory));
    let dialer: Arc<dyn Dialer> = Arc::new(PoolDialer { pool });

    let udp_addr: Option<SocketAddr> = if cfg.listen_udp.is_empty() {
        None
    } else {
        Some(
            cfg.listen_udp
                .parse()
                .map_err(|e| Error::config(format!("invalid listen_udp address: {e}")))?,
        )
    };
    let server = Arc::new(Socks5Server::new(Arc::clone(&dialer), udp_addr));

    if let Some(udp_listen) = (!cfg.listen_udp.is_empty()).then(|| cfg.listen_udp.clone()) {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            if let Err(e) = run_socks5_udp(&udp_listen, server).await {
                warn!(error = %e, "relay-daemon: SOCKS5 UDP listener stopped");
            }
        });
    }

    if !cfg.http_proxy.is_empty() {
        let http_proxy = cfg.http_proxy.clone();
        let dialer = Arc::clone(&dialer);
        tokio::spawn(async move {
            if let Err(e) = crate::http_connect::run(&http_proxy, dialer).await {
                warn!(error = %e, "relay-daemon: HTTP CONNECT front-end stopped");
            }
        });
    }

    run_socks5_tcp(&cfg.listen, server).await
}
