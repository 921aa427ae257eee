//! Adapts a connected [`UdpSocket`] to [`AsyncRead`]/[`AsyncWrite`] so it can
//! stand in anywhere a stream-oriented [`AsyncDuplex`](crate::port::AsyncDuplex)
//! is expected: one `recv`/`send` per poll, preserving datagram boundaries,
//! the same way a connected UDP `net.Conn` behaves in the original Go.
//! Grounded in `original_source/socks5/server.go`'s `ServeUDP`, whose
//! `self.Dial("udp", addr)` returns a `net.Conn` wrapping the same kind of
//! connected UDP socket.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use relay_core::error::{Error, Result};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::UdpSocket;

/// A connected UDP socket exposed as a duplex byte stream: each `poll_read`
/// is one `recv`, each `poll_write` is one `send`.
pub struct ConnectedUdpDuplex {
    socket: UdpSocket,
}

impl ConnectedUdpDuplex {
    /// Binds an ephemeral local socket and connects it to `addr`.
    pub async fn connect(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(Error::Io)?;
        socket.connect(addr).await.map_err(Error::Io)?;
        Ok(Self { socket })
    }
}

impl AsyncRead for ConnectedUdpDuplex {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        self.socket.poll_recv(cx, buf)
    }
}

impl AsyncWrite for ConnectedUdpDuplex {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.socket.poll_send(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
