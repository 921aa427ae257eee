#![forbid(unsafe_code)]

//! A SOCKS5 server: method negotiation, `CONNECT`/`UDP_ASSOCIATE` dispatch,
//! and the UDP envelope relay path. Grounded in
//! `original_source/socks5/server.go`.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use relay_core::error::{Error, Result};
use relay_core::types::{
    DEFAULT_TIMEOUT, DEFAULT_UDP_BUFFER_SIZE, DEFAULT_UDP_TIMEOUT, HANDSHAKE_TIMEOUT,
    UDP_ASSOCIATE_IDLE_TIMEOUT,
};
use relay_stream::port::AsyncDuplex;
use relay_stream::{ConnectedUdpDuplex, Port, RawNetPort, Switch};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::debug;

pub const VERSION: u8 = 5;

pub const CMD_CONNECT: u8 = 1;
pub const CMD_BIND: u8 = 2;
pub const CMD_UDP_ASSOCIATE: u8 = 3;

pub const ATYP_IPV4: u8 = 1;
pub const ATYP_DOMAINNAME: u8 = 3;
pub const ATYP_IPV6: u8 = 4;

pub const REP_SUCCESS: u8 = 0;
pub const REP_GENERAL_FAILURE: u8 = 1;
pub const REP_COMMAND_NOT_SUPPORTED: u8 = 7;
pub const REP_ADDRESS_TYPE_NOT_SUPPORTED: u8 = 8;

/// Dials outbound connections on behalf of a [`Server`]. A single method
/// parameterized on `network` ("tcp"/"udp"), matching
/// `original_source/socks5/server.go`'s `Dial func(string, string) (net.Conn,
/// error)`. Both `CONNECT` and the UDP relay path go through the same
/// abstraction, so a relayer can route either through an intrinsic client
/// context instead of a bare socket just by swapping this one trait object.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, network: &str, addr: &str) -> Result<Box<dyn AsyncDuplex>>;
}

/// Dials directly via the OS network stack.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectDialer;

#[async_trait]
impl Dialer for DirectDialer {
    async fn dial(&self, network: &str, addr: &str) -> Result<Box<dyn AsyncDuplex>> {
        if network.starts_with("udp") {
            let duplex = ConnectedUdpDuplex::connect(addr).await?;
            Ok(Box::new(duplex))
        } else {
            let stream = TcpStream::connect(addr).await.map_err(Error::Io)?;
            Ok(Box::new(stream))
        }
    }
}

#[derive(Debug, Clone)]
pub struct Socks5Request {
    pub ver: u8,
    pub cmd: u8,
    pub atyp: u8,
    pub dst_addr: Vec<u8>,
    pub dst_port: [u8; 2],
}

#[derive(Debug, Clone)]
pub struct Socks5Reply {
    pub ver: u8,
    pub rep: u8,
    pub atyp: u8,
    pub bnd_addr: Vec<u8>,
    pub bnd_port: [u8; 2],
}

/// A SOCKS5 server. `udp_addr` is the address clients are told to send UDP
/// datagrams to after a successful `UDP_ASSOCIATE`; it's `None` when the
/// relayer wasn't configured with a UDP listener, in which case
/// `UDP_ASSOCIATE` requests are refused.
pub struct Server {
    pub udp_addr: Option<SocketAddr>,
    pub dialer: Arc<dyn Dialer>,
}

impl Server {
    pub fn new(dialer: Arc<dyn Dialer>, udp_addr: Option<SocketAddr>) -> Self {
        Self { udp_addr, dialer }
    }

    async fn exchange_metadata(conn: &mut (dyn AsyncDuplex)) -> Result<()> {
        let mut header = [0u8; 2];
        timeout(HANDSHAKE_TIMEOUT, conn.read_exact(&mut header))
            .await
            .map_err(|_| Error::protocol("SOCKS5 handshake timed out reading VER/NMETHODS"))?
            .map_err(Error::Io)?;
        let nmethods = header[1] as usize;
        let mut methods = vec![0u8; nmethods];
        timeout(HANDSHAKE_TIMEOUT, conn.read_exact(&mut methods))
            .await
            .map_err(|_| Error::protocol("SOCKS5 handshake timed out reading METHODS"))?
            .map_err(Error::Io)?;
        // No auth for now: always select method 0x00.
        timeout(HANDSHAKE_TIMEOUT, conn.write_all(&[VERSION, 0]))
            .await
            .map_err(|_| Error::protocol("SOCKS5 handshake timed out writing method selection"))?
            .map_err(Error::Io)?;
        Ok(())
    }

    async fn receive_request(conn: &mut (dyn AsyncDuplex)) -> Result<Socks5Request> {
        let mut head = [0u8; 4];
        timeout(HANDSHAKE_TIMEOUT, conn.read_exact(&mut head))
            .await
            .map_err(|_| Error::protocol("SOCKS5 request header timed out"))?
            .map_err(Error::Io)?;
        let (ver, cmd, atyp) = (head[0], head[1], head[3]);
        let dst_addr = match atyp {
            ATYP_IPV6 => {
                let mut a = [0u8; 16];
                timeout(HANDSHAKE_TIMEOUT, conn.read_exact(&mut a))
                    .await
                    .map_err(|_| Error::protocol("SOCKS5 IPv6 address timed out"))?
                    .map_err(Error::Io)?;
                a.to_vec()
            }
            ATYP_IPV4 => {
                let mut a = [0u8; 4];
                timeout(HANDSHAKE_TIMEOUT, conn.read_exact(&mut a))
                    .await
                    .map_err(|_| Error::protocol("SOCKS5 IPv4 address timed out"))?
                    .map_err(Error::Io)?;
                a.to_vec()
            }
            ATYP_DOMAINNAME => {
                let mut len = [0u8; 1];
                timeout(HANDSHAKE_TIMEOUT, conn.read_exact(&mut len))
                    .await
                    .map_err(|_| Error::protocol("SOCKS5 domain length timed out"))?
                    .map_err(Error::Io)?;
                let mut name = vec![0u8; len[0] as usize];
                timeout(HANDSHAKE_TIMEOUT, conn.read_exact(&mut name))
                    .await
                    .map_err(|_| Error::protocol("SOCKS5 domain name timed out"))?
                    .map_err(Error::Io)?;
                name
            }
            other => return Err(Error::protocol(format!("unsupported ATYP: {other}"))),
        };
        let mut port = [0u8; 2];
        timeout(HANDSHAKE_TIMEOUT, conn.read_exact(&mut port))
            .await
            .map_err(|_| Error::protocol("SOCKS5 port timed out"))?
            .map_err(Error::Io)?;
        Ok(Socks5Request {
            ver,
            cmd,
            atyp,
            dst_addr,
            dst_port: port,
        })
    }

    fn dial_address(req: &Socks5Request) -> Result<String> {
        let port = u16::from_be_bytes(req.dst_port);
        match req.atyp {
            ATYP_IPV4 => {
                let octets: [u8; 4] = req.dst_addr.clone().try_into().map_err(|_| {
                    Error::protocol("malformed IPv4 address in SOCKS5 request")
                })?;
                Ok(format!("{}:{}", std::net::Ipv4Addr::from(octets), port))
            }
            ATYP_IPV6 => {
                let octets: [u8; 16] = req.dst_addr.clone().try_into().map_err(|_| {
                    Error::protocol("malformed IPv6 address in SOCKS5 request")
                })?;
                Ok(format!("[{}]:{}", std::net::Ipv6Addr::from(octets), port))
            }
            ATYP_DOMAINNAME => {
                let name = String::from_utf8(req.dst_addr.clone())
                    .map_err(|_| Error::protocol("malformed domain name in SOCKS5 request"))?;
                Ok(format!("{name}:{port}"))
            }
            other => Err(Error::protocol(format!("unsupported ATYP: {other}"))),
        }
    }

    async fn send_reply(conn: &mut (dyn AsyncDuplex), reply: &Socks5Reply) -> Result<()> {
        timeout(
            HANDSHAKE_TIMEOUT,
            conn.write_all(&[reply.ver, reply.rep, 0, reply.atyp]),
        )
        .await
        .map_err(|_| Error::protocol("SOCKS5 reply timed out"))?
        .map_err(Error::Io)?;
        timeout(HANDSHAKE_TIMEOUT, conn.write_all(&reply.bnd_addr))
            .await
            .map_err(|_| Error::protocol("SOCKS5 reply timed out"))?
            .map_err(Error::Io)?;
        timeout(HANDSHAKE_TIMEOUT, conn.write_all(&reply.bnd_port))
            .await
            .map_err(|_| Error::protocol("SOCKS5 reply timed out"))?
            .map_err(Error::Io)?;
        conn.flush().await.map_err(Error::Io)?;
        Ok(())
    }

    /// Serves one accepted client connection end to end.
    pub async fn serve(&self, mut conn: Box<dyn AsyncDuplex>) -> Result<()> {
        Self::exchange_metadata(&mut *conn).await?;
        let req = Self::receive_request(&mut *conn).await?;
        if req.ver != VERSION {
            return Err(Error::protocol(format!("unsupported SOCKS version: {}", req.ver)));
        }
        match req.cmd {
            CMD_CONNECT => self.handle_connect(conn, req).await,
            CMD_UDP_ASSOCIATE => {
                if self.udp_addr.is_none() {
                    return Err(Error::protocol("UDP server is not initialized"));
                }
                self.handle_udp_associate(conn, req).await
            }
            other => {
                let reply = Socks5Reply {
                    ver: req.ver,
                    rep: REP_COMMAND_NOT_SUPPORTED,
                    atyp: ATYP_IPV4,
                    bnd_addr: vec![0u8; 4],
                    bnd_port: [0, 0],
                };
                let _ = Self::send_reply(&mut *conn, &reply).await;
                Err(Error::protocol(format!("unsupported CMD: {other}")))
            }
        }
    }

    /// Sends the success reply concurrently with dialing the target, to save
    /// a round trip, then bridges client and remote with a raw `Switch`.
    async fn handle_connect(&self, mut conn: Box<dyn AsyncDuplex>, req: Socks5Request) -> Result<()> {
        let addr = Self::dial_address(&req)?;
        let dial = self.dialer.dial("tcp", &addr);
        let reply = async {
            let reply = Socks5Reply {
                ver: req.ver,
                rep: REP_SUCCESS,
                atyp: ATYP_IPV4,
                bnd_addr: vec![0u8; 4],
                bnd_port: [0, 0],
            };
            Self::send_reply(&mut *conn, &reply).await.map(|_| conn)
        };
        let (dial_result, reply_result) = tokio::join!(dial, reply);
        let remote = dial_result?;
        let conn = reply_result?;

        let (client_r, client_w) = tokio::io::split(conn);
        let (remote_r, remote_w) = tokio::io::split(remote);
        let client_port: Arc<dyn Port> = Arc::new(RawNetPort::from_halves(client_r, client_w, DEFAULT_TIMEOUT));
        let remote_port: Arc<dyn Port> = Arc::new(RawNetPort::from_halves(remote_r, remote_w, DEFAULT_TIMEOUT));
        debug!(addr = %addr, "SOCKS5 CONNECT: bridging client and remote");
        Switch::run(client_port, remote_port).await;
        Ok(())
    }

    /// Replies with the UDP relay address, then blocks reading the TCP
    /// control connection (SOCKS5 requires it stay open for the duration of
    /// the UDP association); returns once the client closes it.
    async fn handle_udp_associate(&self, mut conn: Box<dyn AsyncDuplex>, req: Socks5Request) -> Result<()> {
        let udp_addr = self
            .udp_addr
            .ok_or_else(|| Error::protocol("UDP server is not initialized"))?;
        let (atyp, bnd_addr) = match udp_addr.ip() {
            std::net::IpAddr::V4(v4) => (ATYP_IPV4, v4.octets().to_vec()),
            std::net::IpAddr::V6(v6) => (ATYP_IPV6, v6.octets().to_vec()),
        };
        let reply = Socks5Reply {
            ver: req.ver,
            rep: REP_SUCCESS,
            atyp,
            bnd_addr,
            bnd_port: udp_addr.port().to_be_bytes(),
        };
        Self::send_reply(&mut *conn, &reply).await?;
        let mut sink = [0u8; 8];
        loop {
            let n = timeout(UDP_ASSOCIATE_IDLE_TIMEOUT, conn.read(&mut sink))
                .await
                .map_err(|_| Error::protocol("UDP ASSOCIATE control connection idle timeout"))?
                .map_err(Error::Io)?;
            if n == 0 {
                return Ok(());
            }
        }
    }

    /// Parses one SOCKS5 UDP request envelope (`RSV RSV FRAG ATYP DST.ADDR
    /// DST.PORT DATA`), dials the target over UDP, forwards `DATA`, and
    /// relays responses back to `raddr` through `socket`, each prefixed with
    /// the same envelope header the client sent.
    pub async fn serve_udp(&self, socket: &UdpSocket, raddr: SocketAddr, buf: &[u8]) -> Result<()> {
        if buf.len() < 6 {
            return Err(Error::protocol("invalid length of UDP request"));
        }
        if buf[2] != 0 {
            return Err(Error::protocol("fragmentation is not supported"));
        }
        let atyp = buf[3];
        let (addr, offset) = match atyp {
            ATYP_IPV6 => {
                if buf.len() < 4 + 16 {
                    return Err(Error::protocol("truncated IPv6 UDP envelope"));
                }
                let octets: [u8; 16] = buf[4..20].try_into().unwrap();
                (std::net::Ipv6Addr::from(octets).to_string(), 20usize)
            }
            ATYP_IPV4 => {
                if buf.len() < 4 + 4 {
                    return Err(Error::protocol("truncated IPv4 UDP envelope"));
                }
                let octets: [u8; 4] = buf[4..8].try_into().unwrap();
                (std::net::Ipv4Addr::from(octets).to_string(), 8usize)
            }
            ATYP_DOMAINNAME => {
                if buf.len() < 5 {
                    return Err(Error::protocol("truncated domain UDP envelope"));
                }
                let l = buf[4] as usize;
                if buf.len() < 5 + l {
                    return Err(Error::protocol("truncated domain UDP envelope"));
                }
                (
                    String::from_utf8(buf[5..5 + l].to_vec())
                        .map_err(|_| Error::protocol("malformed domain name in UDP envelope"))?,
                    5 + l,
                )
            }
            other => return Err(Error::protocol(format!("unsupported ATYP: {other}"))),
        };
        if buf.len() < offset + 2 {
            return Err(Error::protocol("truncated UDP envelope port"));
        }
        let port = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
        let offset = offset + 2;
        let data = &buf[offset..];
        let header = &buf[..offset];

        let mut remote = self.dialer.dial("udp", &format!("{addr}:{port}")).await?;
        remote.write_all(data).await.map_err(Error::Io)?;

        let mut remote_buf = vec![0u8; DEFAULT_UDP_BUFFER_SIZE];
        loop {
            let n = timeout(DEFAULT_UDP_TIMEOUT, remote.read(&mut remote_buf))
                .await
                .map_err(|_| Error::protocol("UDP relay read timed out"))?
                .map_err(Error::Io)?;
            if n == 0 {
                return Err(Error::protocol("UDP relay remote closed"));
            }
            let mut out = Vec::with_capacity(header.len() + n);
            out.extend_from_slice(header);
            out.extend_from_slice(&remote_buf[..n]);
            socket.send_to(&out, raddr).await.map_err(Error::Io)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn dial_address_formats_ipv4() {
        let req = Socks5Request {
            ver: 5,
            cmd: CMD_CONNECT,
            atyp: ATYP_IPV4,
            dst_addr: vec![127, 0, 0, 1],
            dst_port: 80u16.to_be_bytes(),
        };
        assert_eq!(Server::dial_address(&req).unwrap(), "127.0.0.1:80");
    }

    #[test]
    fn dial_address_formats_domain() {
        let req = Socks5Request {
            ver: 5,
            cmd: CMD_CONNECT,
            atyp: ATYP_DOMAINNAME,
            dst_addr: b"example.com".to_vec(),
            dst_port: 443u16.to_be_bytes(),
        };
        assert_eq!(Server::dial_address(&req).unwrap(), "example.com:443");
    }

    #[tokio::test]
    async fn exchange_metadata_round_trips_over_a_pipe() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let server_task = tokio::spawn(async move {
            Server::exchange_metadata(&mut server).await.unwrap();
        });
        client.write_all(&[5, 1, 0]).await.unwrap();
        let mut resp = [0u8; 2];
        client.read_exact(&mut resp).await.unwrap();
        assert_eq!(resp, [5, 0]);
        server_task.await.unwrap();
    }

    struct StubDialer;

    #[async_trait]
    impl Dialer for StubDialer {
        async fn dial(&self, _network: &str, _addr: &str) -> Result<Box<dyn AsyncDuplex>> {
            let (remote, held) = tokio::io::duplex(256);
            tokio::spawn(async move {
                let mut held = held;
                let mut buf = [0u8; 256];
                loop {
                    match held.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(_) => {}
                    }
                }
            });
            Ok(Box::new(remote))
        }
    }

    #[tokio::test]
    async fn full_connect_handshake_matches_wire_bytes() {
        let server = Arc::new(Server::new(Arc::new(StubDialer), None));
        let (mut client, conn) = tokio::io::duplex(512);
        let server_task = tokio::spawn(async move {
            let _ = server.serve(Box::new(conn)).await;
        });

        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut method_resp = [0u8; 2];
        client.read_exact(&mut method_resp).await.unwrap();
        assert_eq!(method_resp, [0x05, 0x00]);

        client
            .write_all(&[0x05, 0x01, 0x00, 0x01, 0x7f, 0x00, 0x00, 0x01, 0x00, 0x50])
            .await
            .unwrap();
        let mut connect_resp = [0u8; 10];
        client.read_exact(&mut connect_resp).await.unwrap();
        assert_eq!(
            connect_resp,
            [0x05, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );

        drop(client);
        let _ = tokio::time::timeout(Duration::from_secs(2), server_task).await;
    }

    #[tokio::test]
    async fn serve_udp_rejects_nonzero_frag() {
        let server = Server::new(Arc::new(StubDialer), None);
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        // RSV RSV FRAG=1 ATYP=IPV4 ADDR PORT, no data.
        let envelope = [0u8, 0u8, 1u8, ATYP_IPV4, 127, 0, 0, 1, 0, 80];
        let err = server.serve_udp(&socket, peer, &envelope).await.unwrap_err();
        assert!(err.to_string().contains("fragmentation"));
    }
}
