//! The near-end half of the intrinsic protocol: dials a next hop, opens an
//! intrinsic envelope, and hands the caller back a plain duplex connection
//! bridged to whatever the far end relays. Grounded in
//! `original_source/intrinsic/client.go`'s `ClientContext`.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use relay_core::error::{Error, Result};
use relay_core::types::{DEFAULT_TIMEOUT, DEFAULT_UDP_TIMEOUT};
use relay_passes::IoVec;
use relay_router::{Codec, Router};
use relay_stream::port::{split_duplex, AsyncDuplex, RawNetPort, SyncPort};
use relay_stream::{Port, Protocol, Switch};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::codec::UdpDispatchCodec;
use crate::messages::{encode_cbor, Intrinsic, TcpRequest, RELAY_TCP, RELAY_UDP};

/// Dials the next hop. Swappable so tests (and, eventually, a relayer
/// bridging through yet another transport) don't need a real socket.
#[async_trait]
pub trait InternalDialer: Send + Sync {
    async fn dial(&self, addr: &str) -> Result<Box<dyn AsyncDuplex>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DirectInternalDialer;

#[async_trait]
impl InternalDialer for DirectInternalDialer {
    async fn dial(&self, addr: &str) -> Result<Box<dyn AsyncDuplex>> {
        let stream = TcpStream::connect(addr).await.map_err(Error::Io)?;
        Ok(Box::new(stream))
    }
}

/// One multiplexed TCP connection to the next hop, carrying UDP flows as
/// routed frames, paired with the dispatcher that assigns them route ids.
struct UdpRouter {
    router: Arc<Router>,
    codec: Arc<UdpDispatchCodec>,
}

/// Dials `next` on behalf of a local SOCKS5 (or HTTP CONNECT) front-end,
/// speaking the intrinsic protocol to request a TCP bridge or a UDP relay.
/// Keeps up to `limit` multiplexed TCP connections to `next` open for UDP
/// traffic, picking one at random for each new UDP flow.
pub struct ClientContext {
    next: String,
    limit: usize,
    protocol_factory: Arc<dyn Fn() -> Option<Box<dyn Protocol>> + Send + Sync>,
    dialer: Arc<dyn InternalDialer>,
    udp_routers: Mutex<Vec<UdpRouter>>,
}

impl ClientContext {
    pub fn new(
        next: impl Into<String>,
        limit: usize,
        protocol_factory: Arc<dyn Fn() -> Option<Box<dyn Protocol>> + Send + Sync>,
        dialer: Arc<dyn InternalDialer>,
    ) -> Self {
        Self {
            next: next.into(),
            limit: limit.max(1),
            protocol_factory,
            dialer,
            udp_routers: Mutex::new(Vec::new()),
        }
    }

    fn wrap_framed(&self, conn: Box<dyn AsyncDuplex>) -> Arc<dyn Port> {
        let (r, w) = split_duplex(conn);
        match (self.protocol_factory)() {
            None => Arc::new(RawNetPort::from_halves(r, w, DEFAULT_TIMEOUT)),
            Some(protocol) => Arc::new(relay_stream::port::NetPort::from_halves(r, w, protocol, DEFAULT_TIMEOUT)),
        }
    }

    /// Opens a fresh intrinsic TCP bridge: dials `next`, sends a `RELAY_TCP`
    /// envelope naming `addr`, then bridges a local in-memory pipe to that
    /// connection so the caller gets back a plain duplex stream.
    pub async fn dial_tcp(&self, addr: &str) -> Result<Box<dyn AsyncDuplex>> {
        let conn = self.dialer.dial(&self.next).await?;
        let next_port = self.wrap_framed(conn);

        let req = TcpRequest { addr: addr.to_string() };
        let intrinsic = Intrinsic {
            func: RELAY_TCP,
            data: encode_cbor(&req)?,
        };
        next_port.pack(IoVec::from(encode_cbor(&intrinsic)?)).await?;

        let (local, remote) = tokio::io::duplex(64 * 1024);
        let (local_r, local_w) = split_duplex(Box::new(remote) as Box<dyn AsyncDuplex>);
        let local_port: Arc<dyn Port> = Arc::new(RawNetPort::from_halves(local_r, local_w, DEFAULT_TIMEOUT));
        tokio::spawn(async move {
            Switch::run(next_port, local_port).await;
        });
        Ok(Box::new(local))
    }

    /// Routes one UDP flow through a (possibly shared) multiplexed
    /// connection to `next`. Returns a plain duplex stream: bytes written
    /// to it become outbound datagrams to `addr`, bytes read from it are
    /// datagrams `addr` sent back.
    pub async fn dial_udp(&self, addr: &str) -> Result<Box<dyn AsyncDuplex>> {
        let udp_router = self.get_or_create_udp_router().await?;
        let id = udp_router.codec.new_id(addr);

        let (local, remote) = tokio::io::duplex(64 * 1024);
        let (remote_r, remote_w) = split_duplex(Box::new(remote) as Box<dyn AsyncDuplex>);
        let route_port: Arc<dyn Port> = Arc::new(RawNetPort::from_halves(remote_r, remote_w, DEFAULT_UDP_TIMEOUT));

        let (route_info, result) = Router::new_route(&udp_router.router, id, route_port);
        result?;

        let codec = Arc::clone(&udp_router.codec);
        tokio::spawn(async move {
            let err = route_info.wait_for_error().await;
            debug!(route_id = id, ?err, "intrinsic: UDP route closed");
            codec.free_id(id);
        });
        Ok(Box::new(local))
    }

    async fn get_or_create_udp_router(&self) -> Result<Arc<UdpRouterHandle>> {
        let mut routers = self.udp_routers.lock().await;
        if routers.len() < self.limit {
            match self.open_udp_router().await {
                Ok(r) => routers.push(r),
                Err(e) => debug!(error = %e, "intrinsic: failed to open a new UDP router"),
            }
        }
        if routers.is_empty() {
            return Err(Error::protocol("no UDP router is available"));
        }
        let idx = rand::thread_rng().gen_range(0..routers.len());
        Ok(Arc::new(UdpRouterHandle {
            router: Arc::clone(&routers[idx].router),
            codec: Arc::clone(&routers[idx].codec),
        }))
    }

    async fn open_udp_router(&self) -> Result<UdpRouter> {
        let conn = self.dialer.dial(&self.next).await?;
        let framed = self.wrap_framed(conn);
        let shared: Arc<dyn Port> = Arc::new(SyncPort::new(framed));

        let intrinsic = Intrinsic {
            func: RELAY_UDP,
            data: Vec::new(),
        };
        shared.pack(IoVec::from(encode_cbor(&intrinsic)?)).await?;

        let codec = Arc::new(UdpDispatchCodec::new());
        let router = Router::new(shared, Arc::clone(&codec) as Arc<dyn Codec>);
        tokio::spawn(Router::run(Arc::clone(&router)));
        Ok(UdpRouter { router, codec })
    }
}

/// A resolved, ready-to-use router handle returned from the router pool.
type UdpRouterHandle = UdpRouter;

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn dial_tcp_sends_intrinsic_envelope_and_bridges_pipe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let next_addr = listener.local_addr().unwrap().to_string();

        let accept_task = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            // Read the LV-framed intrinsic envelope, then the LV-framed
            // payload the switch relays afterward, and echo that payload
            // back as its own LV frame.
            let mut len_buf = [0u8; 4];
            sock.read_exact(&mut len_buf).await.unwrap();
            let len = u32::from_be_bytes(len_buf) as usize;
            let mut body = vec![0u8; len];
            sock.read_exact(&mut body).await.unwrap();

            sock.read_exact(&mut len_buf).await.unwrap();
            let len = u32::from_be_bytes(len_buf) as usize;
            let mut payload = vec![0u8; len];
            sock.read_exact(&mut payload).await.unwrap();
            assert_eq!(payload, b"hello");

            sock.write_all(&(payload.len() as u32).to_be_bytes()).await.unwrap();
            sock.write_all(&payload).await.unwrap();
        });

        let ctx = ClientContext::new(
            next_addr,
            4,
            Arc::new(|| Some(Box::new(relay_stream::LvProtocol) as Box<dyn Protocol>)),
            Arc::new(DirectInternalDialer),
        );
        let mut conn = ctx.dial_tcp("example.com:80").await.unwrap();
        conn.write_all(b"hello").await.unwrap();
        let mut back = [0u8; 5];
        conn.read_exact(&mut back).await.unwrap();
        assert_eq!(&back, b"hello");
        accept_task.await.unwrap();
    }
}
