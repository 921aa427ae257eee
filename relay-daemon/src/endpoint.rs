//! Endpoint mode: this instance has no next hop (spec.md §4.10). Every
//! accepted connection is wrapped in a framed [`Port`] using the hop's
//! configured protocol and handed straight to the intrinsic
//! [`relay_intrinsic::Server`], which performs the real TCP/UDP egress.
//! Grounded in `original_source/relayer/relayer.go`'s endpoint accept loop.

use std::sync::Arc;

use relay_core::error::{Error, Result};
use relay_core::types::DEFAULT_TIMEOUT;
use relay_intrinsic::Server as IntrinsicServer;
use relay_stream::port::{split_duplex, AsyncDuplex};
use relay_stream::{NetPort, Port, Protocol, RawNetPort};
use tokio::net::TcpListener;
use tracing::debug;

fn wrap_port(conn: Box<dyn AsyncDuplex>, protocol: Option<Box<dyn Protocol>>) -> Arc<dyn Port> {
    let (r, w) = split_duplex(conn);
    match protocol {
        None => Arc::new(RawNetPort::from_halves(r, w, DEFAULT_TIMEOUT)),
        Some(p) => Arc::new(NetPort::from_halves(r, w, p, DEFAULT_TIMEOUT)),
    }
}

/// Accepts connections on `listen` forever, serving each as one intrinsic
/// session.
pub async fn run(
    listen: &str,
    protocol_factory: Arc<dyn Fn() -> Option<Box<dyn Protocol>> + Send + Sync>,
) -> Result<()> {
    let listener = TcpListener::bind(listen).await.map_err(Error::Io)?;
    debug!(listen, "relay-daemon: endpoint listening");
    loop {
        let (sock, peer) = listener.accept().await.map_err(Error::Io)?;
        let factory = Arc::clone(&protocol_factory);
        tokio::spawn(async move {
            let port = wrap_port(Box::new(sock) as Box<dyn AsyncDuplex>, factory());
            if let Err(e) = IntrinsicServer::new(port).run().await {
                debug!(peer = %peer, error = %e, "relay-daemon: endpoint session ended");
            }
        });
    }
}
