//! `Port`: a stateful connection wrapper. `RawNetPort` does no framing;
//! `NetPort` delegates framing to a
//! [`Protocol`]; `SyncPort` wraps any `Port` so that whole pack/unpack calls
//! (not just their individual reads/writes) are serialized against
//! concurrent callers, needed once a single port is shared across many
//! logical routes (see `relay-router`). Grounded in
//! `original_source/core/port.go`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_core::error::{Error, Result};
use relay_core::types::{DEFAULT_BUFFER_SIZE, DEFAULT_BUFFER_LIMIT, DEFAULT_TIMEOUT};
use relay_passes::IoVec;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::protocol::Protocol;

/// A duplex byte stream, boxed so `Port` impls don't need to be generic over
/// the concrete transport (`TcpStream`, a TLS stream, an in-memory pipe, ...).
pub trait AsyncDuplex: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncDuplex for T {}

/// Packs and unpacks whole logical messages against an underlying
/// connection. Every method applies `self`'s read/write deadline.
///
/// `close_write`/`close_read` implement the half-close spec.md §4.5
/// describes: `close_write` shuts down the underlying transport's write
/// direction (a real TCP FIN where the transport supports it), telling the
/// peer no more data is coming; `close_read` marks this port's read side
/// closed so a concurrent or subsequent `unpack` fails fast instead of
/// blocking on a connection nobody will write to again. Both default to a
/// no-op for ports with no natural half-close (e.g. a `SyncPort` delegates
/// to its inner port).
#[async_trait]
pub trait Port: Send + Sync {
    async fn pack(&self, iov: IoVec) -> Result<()>;
    async fn unpack(&self) -> Result<IoVec>;

    async fn close_write(&self) -> Result<()> {
        Ok(())
    }

    async fn close_read(&self) -> Result<()> {
        Ok(())
    }
}

/// Lets an `Arc<dyn Port>` (or any `Arc<P: Port>`) stand in for `P` itself,
/// so callers that only have a shared handle (the router, the intrinsic
/// relay) can still hand it to `SyncPort::new` or any other `P: Port` bound
/// without an extra wrapper type.
#[async_trait]
impl<P: Port + ?Sized> Port for Arc<P> {
    async fn pack(&self, iov: IoVec) -> Result<()> {
        (**self).pack(iov).await
    }

    async fn unpack(&self) -> Result<IoVec> {
        (**self).unpack().await
    }

    async fn close_write(&self) -> Result<()> {
        (**self).close_write().await
    }

    async fn close_read(&self) -> Result<()> {
        (**self).close_read().await
    }
}

/// An unframed port: `pack` writes the payload as-is, `unpack` returns
/// whatever the next `read` call yields into a fixed [`DEFAULT_BUFFER_SIZE`]
/// scratch buffer.
pub struct RawNetPort {
    read: Mutex<(tokio::io::ReadHalf<Box<dyn AsyncDuplex>>, Vec<u8>)>,
    write: Mutex<tokio::io::WriteHalf<Box<dyn AsyncDuplex>>>,
    timeout: Duration,
    read_closed: AtomicBool,
    write_closed: AtomicBool,
}

/// Splits a duplex stream into independently-lockable read/write halves.
/// `RawNetPort`/`NetPort` each need this because `pack` and `unpack` can run
/// concurrently from different tasks (see `SyncPort`, and the router, which
/// shares one port across many routes).
pub fn split_duplex(conn: Box<dyn AsyncDuplex>) -> (tokio::io::ReadHalf<Box<dyn AsyncDuplex>>, tokio::io::WriteHalf<Box<dyn AsyncDuplex>>) {
    tokio::io::split(conn)
}

impl RawNetPort {
    pub fn from_halves(
        read_half: tokio::io::ReadHalf<Box<dyn AsyncDuplex>>,
        write_half: tokio::io::WriteHalf<Box<dyn AsyncDuplex>>,
        timeout: Duration,
    ) -> Self {
        Self {
            read: Mutex::new((read_half, vec![0u8; DEFAULT_BUFFER_SIZE])),
            write: Mutex::new(write_half),
            timeout,
            read_closed: AtomicBool::new(false),
            write_closed: AtomicBool::new(false),
        }
    }

    pub fn with_default_timeout(
        read_half: tokio::io::ReadHalf<Box<dyn AsyncDuplex>>,
        write_half: tokio::io::WriteHalf<Box<dyn AsyncDuplex>>,
    ) -> Self {
        Self::from_halves(read_half, write_half, DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl Port for RawNetPort {
    async fn pack(&self, iov: IoVec) -> Result<()> {
        if self.write_closed.load(Ordering::Acquire) {
            return Err(Error::protocol("RawNetPort write side is closed"));
        }
        let payload = iov.concat();
        let mut guard = self.write.lock().await;
        timeout(self.timeout, guard.write_all(&payload))
            .await
            .map_err(|_| Error::protocol("RawNetPort write timed out"))?
            .map_err(Error::Io)?;
        Ok(())
    }

    async fn unpack(&self) -> Result<IoVec> {
        if self.read_closed.load(Ordering::Acquire) {
            return Err(Error::protocol("RawNetPort read side is closed"));
        }
        let mut guard = self.read.lock().await;
        let (conn, buf) = &mut *guard;
        let prev_cap = buf.len();
        let n = timeout(self.timeout, conn.read(buf))
            .await
            .map_err(|_| Error::protocol("RawNetPort read timed out"))?
            .map_err(Error::Io)?;
        if n == 0 {
            return Err(Error::protocol("RawNetPort read EOF"));
        }
        // Grow the scratch buffer when a read fills it entirely (the peer
        // likely has more queued than we gave it room for), clamped at
        // `DEFAULT_BUFFER_LIMIT`; shrink back toward the default once reads
        // are using only a small fraction of a grown buffer.
        if n == prev_cap && prev_cap < DEFAULT_BUFFER_LIMIT {
            buf.resize((prev_cap * 2).min(DEFAULT_BUFFER_LIMIT), 0);
        } else if prev_cap > DEFAULT_BUFFER_SIZE && n * 4 < prev_cap {
            buf.resize(DEFAULT_BUFFER_SIZE.max(n), 0);
        }
        Ok(IoVec::from_slice(&buf[..n]))
    }

    async fn close_write(&self) -> Result<()> {
        self.write_closed.store(true, Ordering::Release);
        let mut guard = self.write.lock().await;
        guard.shutdown().await.map_err(Error::Io)
    }

    async fn close_read(&self) -> Result<()> {
        self.read_closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// A framed port: every `pack`/`unpack` delegates to a [`Protocol`] for
/// framing. The read side is buffered (`BufReader`) since `HttpProtocol`
/// needs line-oriented reads.
pub struct NetPort {
    read: Mutex<BufReader<tokio::io::ReadHalf<Box<dyn AsyncDuplex>>>>,
    write: Mutex<tokio::io::WriteHalf<Box<dyn AsyncDuplex>>>,
    protocol: Box<dyn Protocol>,
    timeout: Duration,
    read_closed: AtomicBool,
    write_closed: AtomicBool,
}

impl NetPort {
    pub fn from_halves(
        read_half: tokio::io::ReadHalf<Box<dyn AsyncDuplex>>,
        write_half: tokio::io::WriteHalf<Box<dyn AsyncDuplex>>,
        protocol: Box<dyn Protocol>,
        timeout: Duration,
    ) -> Self {
        Self {
            read: Mutex::new(BufReader::new(read_half)),
            write: Mutex::new(write_half),
            protocol,
            timeout,
            read_closed: AtomicBool::new(false),
            write_closed: AtomicBool::new(false),
        }
    }

    pub fn with_default_timeout(
        read_half: tokio::io::ReadHalf<Box<dyn AsyncDuplex>>,
        write_half: tokio::io::WriteHalf<Box<dyn AsyncDuplex>>,
        protocol: Box<dyn Protocol>,
    ) -> Self {
        Self::from_halves(read_half, write_half, protocol, DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl Port for NetPort {
    async fn pack(&self, mut iov: IoVec) -> Result<()> {
        if self.write_closed.load(Ordering::Acquire) {
            return Err(Error::protocol("NetPort write side is closed"));
        }
        let mut guard = self.write.lock().await;
        timeout(self.timeout, self.protocol.pack(&mut iov, &mut *guard))
            .await
            .map_err(|_| Error::protocol("NetPort pack timed out"))??;
        Ok(())
    }

    async fn unpack(&self) -> Result<IoVec> {
        if self.read_closed.load(Ordering::Acquire) {
            return Err(Error::protocol("NetPort read side is closed"));
        }
        let mut guard = self.read.lock().await;
        timeout(self.timeout, self.protocol.unpack(&mut *guard))
            .await
            .map_err(|_| Error::protocol("NetPort unpack timed out"))?
    }

    async fn close_write(&self) -> Result<()> {
        self.write_closed.store(true, Ordering::Release);
        let mut guard = self.write.lock().await;
        guard.shutdown().await.map_err(Error::Io)
    }

    async fn close_read(&self) -> Result<()> {
        self.read_closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Wraps any `Port` with two independent locks, one for packing and one for
/// unpacking, so whole logical messages from concurrent callers never
/// interleave on the wire. The inner port's own locking (see `RawNetPort`/
/// `NetPort` above) only protects individual reads/writes from data races;
/// `SyncPort` is what makes a *logical* pack or unpack atomic end to end.
pub struct SyncPort<P: Port> {
    inner: P,
    pack_lock: Mutex<()>,
    unpack_lock: Mutex<()>,
}

impl<P: Port> SyncPort<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            pack_lock: Mutex::new(()),
            unpack_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl<P: Port> Port for SyncPort<P> {
    async fn pack(&self, iov: IoVec) -> Result<()> {
        let _guard = self.pack_lock.lock().await;
        self.inner.pack(iov).await
    }

    async fn unpack(&self) -> Result<IoVec> {
        let _guard = self.unpack_lock.lock().await;
        self.inner.unpack().await
    }

    async fn close_write(&self) -> Result<()> {
        self.inner.close_write().await
    }

    async fn close_read(&self) -> Result<()> {
        self.inner.close_read().await
    }
}
