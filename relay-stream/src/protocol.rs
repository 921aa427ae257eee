//! Frame protocols: `Lv` (length-prefixed), `Http` (mimics an HTTP/1.1 POST),
//! and `Variant` (a random 1-byte index selecting one of N inner protocols).
//! `ProtocolWithPass` composes a `Protocol` with a pack/unpack [`PassManager`]
//! pair, running the pass pipeline before packing and after unpacking.
//! Grounded in `original_source/core/protocol.go` and the `LVProtocol`/
//! `VariantProtocol` pair `original_source/core/protocol_test.go` exercises.

use async_trait::async_trait;
use relay_core::error::{Error, Result};
use relay_core::types::UNUSUAL_BUFFER_LENGTH_THRESHOLD;
use relay_passes::pass::PassManager;
use relay_passes::IoVec;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// A single framed message exchange: `pack` writes one message, `unpack`
/// reads one. Every implementation enforces its own size ceiling so a
/// misbehaving peer can't force an unbounded read.
#[async_trait]
pub trait Protocol: Send + Sync {
    async fn pack(&self, iov: &mut IoVec, w: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<()>;
    async fn unpack(&self, r: &mut (dyn AsyncBufRead + Unpin + Send)) -> Result<IoVec>;
}

/// 4-byte big-endian length prefix followed by that many bytes of payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct LvProtocol;

#[async_trait]
impl Protocol for LvProtocol {
    async fn pack(&self, iov: &mut IoVec, w: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<()> {
        let payload = iov.consume();
        if payload.len() > UNUSUAL_BUFFER_LENGTH_THRESHOLD {
            return Err(Error::protocol(format!(
                "LV payload of {} bytes exceeds the {} byte threshold",
                payload.len(),
                UNUSUAL_BUFFER_LENGTH_THRESHOLD
            )));
        }
        w.write_u32(payload.len() as u32).await.map_err(Error::Io)?;
        w.write_all(&payload).await.map_err(Error::Io)?;
        w.flush().await.map_err(Error::Io)?;
        Ok(())
    }

    async fn unpack(&self, r: &mut (dyn AsyncBufRead + Unpin + Send)) -> Result<IoVec> {
        let len = r.read_u32().await.map_err(Error::Io)? as usize;
        if len > UNUSUAL_BUFFER_LENGTH_THRESHOLD {
            return Err(Error::protocol(format!(
                "LV declared length {len} exceeds the {UNUSUAL_BUFFER_LENGTH_THRESHOLD} byte threshold"
            )));
        }
        let mut buf = vec![0u8; len];
        r.read_exact(&mut buf).await.map_err(Error::Io)?;
        Ok(IoVec::from(buf))
    }
}

/// Mimics an HTTP/1.1 `POST /` request. The body carries the payload; framing
/// is via `Content-Length`, not chunked encoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpProtocol;

#[async_trait]
impl Protocol for HttpProtocol {
    async fn pack(&self, iov: &mut IoVec, w: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<()> {
        let payload = iov.consume();
        let header = format!(
            "POST / HTTP/1.1\r\nUser-Agent: Mozilla/5.0\r\nContent-Length: {}\r\n\r\n",
            payload.len()
        );
        w.write_all(header.as_bytes()).await.map_err(Error::Io)?;
        w.write_all(&payload).await.map_err(Error::Io)?;
        w.flush().await.map_err(Error::Io)?;
        Ok(())
    }

    async fn unpack(&self, r: &mut (dyn AsyncBufRead + Unpin + Send)) -> Result<IoVec> {
        let mut request_line = String::new();
        r.read_line(&mut request_line).await.map_err(Error::Io)?;
        if request_line.is_empty() {
            return Err(Error::protocol("HTTP request line missing (peer closed)"));
        }
        let mut content_length: Option<i64> = None;
        loop {
            let mut line = String::new();
            let n = r.read_line(&mut line).await.map_err(Error::Io)?;
            if n == 0 {
                return Err(Error::protocol("HTTP headers truncated before a blank line"));
            }
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                break;
            }
            if let Some((name, value)) = trimmed.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse::<i64>().ok();
                }
            }
        }
        let len = content_length
            .ok_or_else(|| Error::protocol("HTTP request missing Content-Length"))?;
        if len < 0 || len as usize > UNUSUAL_BUFFER_LENGTH_THRESHOLD {
            return Err(Error::protocol(format!("invalid Content-Length {len}")));
        }
        let mut body = vec![0u8; len as usize];
        r.read_exact(&mut body).await.map_err(Error::Io)?;
        Ok(IoVec::from(body))
    }
}

/// Writes a uniform random 1-byte index, then delegates to the inner
/// protocol at `index mod protocols.len()`; unpack reads the index back off
/// the wire and dispatches the same way.
pub struct VariantProtocol {
    protocols: Vec<Box<dyn Protocol>>,
}

impl VariantProtocol {
    pub fn new() -> Self {
        Self { protocols: Vec::new() }
    }

    pub fn add(mut self, p: Box<dyn Protocol>) -> Self {
        self.protocols.push(p);
        self
    }
}

impl Default for VariantProtocol {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Protocol for VariantProtocol {
    async fn pack(&self, iov: &mut IoVec, w: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<()> {
        if self.protocols.is_empty() {
            return Err(Error::protocol("VariantProtocol has no inner protocols registered"));
        }
        let index = (rand::random::<u8>() as usize) % self.protocols.len();
        w.write_u8(index as u8).await.map_err(Error::Io)?;
        self.protocols[index].pack(iov, w).await
    }

    async fn unpack(&self, r: &mut (dyn AsyncBufRead + Unpin + Send)) -> Result<IoVec> {
        if self.protocols.is_empty() {
            return Err(Error::protocol("VariantProtocol has no inner protocols registered"));
        }
        let index = r.read_u8().await.map_err(Error::Io)? as usize % self.protocols.len();
        self.protocols[index].unpack(r).await
    }
}

/// Composes a framing `Protocol` with a pack/unpack pass pipeline: pack runs
/// the pack passes then delegates to `P::pack`; unpack delegates to
/// `P::unpack` then runs the unpack passes.
pub struct ProtocolWithPass {
    pub protocol: Box<dyn Protocol>,
    pub pack_passes: PassManager,
    pub unpack_passes: PassManager,
}

#[async_trait]
impl Protocol for ProtocolWithPass {
    async fn pack(&self, iov: &mut IoVec, w: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<()> {
        let mut rng = rand::thread_rng();
        self.pack_passes.run(iov, &mut rng)?;
        self.protocol.pack(iov, w).await
    }

    async fn unpack(&self, r: &mut (dyn AsyncBufRead + Unpin + Send)) -> Result<IoVec> {
        let mut iov = self.protocol.unpack(r).await?;
        let mut rng = rand::thread_rng();
        self.unpack_passes.run(&mut iov, &mut rng)?;
        Ok(iov)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn lv_protocol_round_trips_over_a_pipe() {
        let (client, server) = tokio::io::duplex(4096);
        let (mut reader, mut writer) = tokio::io::split(server);
        let mut read_half = BufReader::new(&mut reader);
        let (_client_reader, mut client_writer) = tokio::io::split(client);

        let pack_task = tokio::spawn(async move {
            let mut iov = IoVec::from_slice(b"wtfwtfwtfwtf");
            LvProtocol.pack(&mut iov, &mut client_writer).await.unwrap();
        });
        let unpacked = LvProtocol.unpack(&mut read_half).await.unwrap();
        pack_task.await.unwrap();
        drop(writer);
        assert_eq!(unpacked.concat().as_ref(), b"wtfwtfwtfwtf");
    }

    #[tokio::test]
    async fn http_protocol_round_trips_over_a_pipe() {
        let (client, server) = tokio::io::duplex(4096);
        let (mut reader, writer) = tokio::io::split(server);
        let mut read_half = BufReader::new(&mut reader);
        let (_client_reader, mut client_writer) = tokio::io::split(client);

        let pack_task = tokio::spawn(async move {
            let mut iov = IoVec::from_slice(b"wtfwtfwtfwtf");
            HttpProtocol.pack(&mut iov, &mut client_writer).await.unwrap();
        });
        let unpacked = HttpProtocol.unpack(&mut read_half).await.unwrap();
        pack_task.await.unwrap();
        drop(writer);
        assert_eq!(unpacked.concat().as_ref(), b"wtfwtfwtfwtf");
    }

    #[tokio::test]
    async fn http_unpack_rejects_missing_content_length() {
        let raw = b"POST / HTTP/1.1\r\nUser-Agent: Mozilla/5.0\r\n\r\n".to_vec();
        let mut reader = BufReader::new(Cursor::new(raw));
        assert!(HttpProtocol.unpack(&mut reader).await.is_err());
    }
}
