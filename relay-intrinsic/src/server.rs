//! The far-end dispatcher: reads one [`Intrinsic`] envelope off a port and
//! either bridges a TCP connection or relays UDP datagrams for as long as
//! the peer keeps asking. Grounded in `original_source/intrinsic/server.go`.

use std::sync::Arc;

use relay_core::error::{Error, Result};
use relay_core::types::{DEFAULT_TIMEOUT, DEFAULT_UDP_BUFFER_SIZE, DEFAULT_UDP_TIMEOUT};
use relay_passes::IoVec;
use relay_stream::port::{split_duplex, AsyncDuplex, RawNetPort, SyncPort};
use relay_stream::{Port, Switch};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::debug;

use crate::messages::{decode_cbor, encode_cbor, Intrinsic, TcpRequest, UdpMessage, RELAY_TCP, RELAY_UDP};

/// Serves a single incoming intrinsic connection, already wrapped in a
/// framed [`Port`]. Consumes exactly one [`Intrinsic`] envelope to decide
/// what to do, then either bridges (`RELAY_TCP`) or relays indefinitely
/// (`RELAY_UDP`).
pub struct Server {
    pub port: Arc<dyn Port>,
}

impl Server {
    pub fn new(port: Arc<dyn Port>) -> Self {
        Self { port }
    }

    pub async fn run(self) -> Result<()> {
        let mut iov = self.port.unpack().await?;
        let intrinsic: Intrinsic = decode_cbor(&iov.consume())?;
        match intrinsic.func {
            RELAY_TCP => {
                let req: TcpRequest = decode_cbor(&intrinsic.data)?;
                self.relay_tcp(&req.addr).await
            }
            RELAY_UDP => self.relay_udp().await,
            other => Err(Error::protocol(format!("unsupported intrinsic function: {other}"))),
        }
    }

    async fn relay_tcp(&self, addr: &str) -> Result<()> {
        let remote = TcpStream::connect(addr).await.map_err(Error::Io)?;
        let (r, w) = split_duplex(Box::new(remote) as Box<dyn AsyncDuplex>);
        let remote_port: Arc<dyn Port> = Arc::new(RawNetPort::from_halves(r, w, DEFAULT_TIMEOUT));
        debug!(addr, "intrinsic: RELAY_TCP bridging to target");
        Switch::run(Arc::clone(&self.port), remote_port).await;
        Ok(())
    }

    /// Relays UDP datagrams indefinitely. Each incoming [`UdpMessage`] spawns
    /// its own dial + response loop against `msg.addr`. The far end is
    /// stateless per datagram, matching the original's one-socket-per-message
    /// design, rather than caching a socket per destination.
    async fn relay_udp(&self) -> Result<()> {
        let sync_port: Arc<dyn Port> = Arc::new(SyncPort::new(Arc::clone(&self.port)));
        loop {
            let mut iov = sync_port.unpack().await?;
            let msg: UdpMessage = decode_cbor(&iov.consume())?;
            let reply_port = Arc::clone(&sync_port);
            tokio::spawn(async move {
                if let Err(e) = Self::relay_one_udp_message(msg, reply_port).await {
                    debug!(error = %e, "intrinsic: UDP relay session ended");
                }
            });
        }
    }

    async fn relay_one_udp_message(msg: UdpMessage, reply_port: Arc<dyn Port>) -> Result<()> {
        let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(Error::Io)?;
        socket.connect(&msg.addr).await.map_err(Error::Io)?;
        socket.send(&msg.data).await.map_err(Error::Io)?;
        let mut buf = vec![0u8; DEFAULT_UDP_BUFFER_SIZE];
        loop {
            let n = timeout(DEFAULT_UDP_TIMEOUT, socket.recv(&mut buf))
                .await
                .map_err(|_| Error::protocol("intrinsic UDP relay read timed out"))?
                .map_err(Error::Io)?;
            let reply = UdpMessage {
                id: msg.id,
                addr: msg.addr.clone(),
                data: buf[..n].to_vec(),
            };
            let bytes = encode_cbor(&reply)?;
            reply_port.pack(IoVec::from(bytes)).await?;
        }
    }
}
