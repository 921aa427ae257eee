//! The HTTP CONNECT front-end: a trivial hijack-and-switch, not a general
//! HTTP/1.1 server. spec.md §1 names this as an external collaborator, but
//! §4.10 lists it as something the relayer orchestration still has to host;
//! SPEC_FULL.md §13 supplements it. Grounded in
//! `original_source/frontend/http/server.go`.

use std::sync::Arc;

use relay_core::error::{Error, Result};
use relay_core::types::DEFAULT_TIMEOUT;
use relay_passes::IoVec;
use relay_socks5::Dialer;
use relay_stream::port::{split_duplex, AsyncDuplex};
use relay_stream::{Port, RawNetPort, Switch};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

/// Reads bytes from `stream` until `\r\n\r\n` appears, returning the bytes up
/// to and including that delimiter plus whatever came after it in the same
/// read (so a caller that needs to keep reading the connection doesn't lose
/// any body bytes a client sent ahead of the 200 reply). A plain growable
/// buffer rather than `BufReader::read_line`, since `BufReader::into_inner`
/// would silently discard any read-ahead past the headers.
async fn read_until_blank_line(stream: &mut TcpStream) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut buf = Vec::with_capacity(512);
    let mut chunk = [0u8; 512];
    loop {
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            let header_end = pos + 4;
            let leftover = buf.split_off(header_end);
            return Ok((buf, leftover));
        }
        if buf.len() > 64 * 1024 {
            return Err(Error::protocol("HTTP CONNECT request headers too large"));
        }
        let n = stream.read(&mut chunk).await.map_err(Error::Io)?;
        if n == 0 {
            return Err(Error::protocol("HTTP CONNECT peer closed before headers completed"));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parses `CONNECT host:port HTTP/1.1` out of the request line. Any other
/// verb is rejected.
fn parse_connect_target(headers: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(headers)
        .map_err(|_| Error::protocol("HTTP CONNECT request is not valid UTF-8"))?;
    let request_line = text
        .split("\r\n")
        .next()
        .ok_or_else(|| Error::protocol("HTTP CONNECT request missing a request line"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| Error::protocol("HTTP CONNECT request line is empty"))?;
    if !method.eq_ignore_ascii_case("CONNECT") {
        return Err(Error::protocol(format!("unsupported HTTP front-end method: {method}")));
    }
    let target = parts
        .next()
        .ok_or_else(|| Error::protocol("HTTP CONNECT request missing a target"))?;
    Ok(target.to_string())
}

async fn serve_one(mut sock: TcpStream, dialer: Arc<dyn Dialer>) -> Result<()> {
    let (headers, leftover) = read_until_blank_line(&mut sock).await?;
    let target = match parse_connect_target(&headers) {
        Ok(target) => target,
        Err(e) => {
            let _ = sock.write_all(b"HTTP/1.1 501 Not Implemented\r\n\r\n").await;
            return Err(e);
        }
    };

    let remote = match dialer.dial("tcp", &target).await {
        Ok(remote) => remote,
        Err(e) => {
            let _ = sock
                .write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n")
                .await;
            return Err(e);
        }
    };
    sock.write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
        .await
        .map_err(Error::Io)?;

    let (client_r, client_w) = split_duplex(Box::new(sock) as Box<dyn AsyncDuplex>);
    let client_port: Arc<dyn Port> = Arc::new(RawNetPort::from_halves(client_r, client_w, DEFAULT_TIMEOUT));
    let (remote_r, remote_w) = split_duplex(remote);
    let remote_port: Arc<dyn Port> = Arc::new(RawNetPort::from_halves(remote_r, remote_w, DEFAULT_TIMEOUT));

    // A client that pipelines bytes ahead of the 200 reply has them sitting
    // in `leftover` rather than lost in a discarded `BufReader`; forward them
    // to the remote before the switch takes over so ordering is preserved.
    if !leftover.is_empty() {
        remote_port.pack(IoVec::from(leftover)).await?;
    }

    debug!(target = %target, "HTTP CONNECT: bridging client and remote");
    Switch::run(client_port, remote_port).await;
    Ok(())
}

/// Accepts connections on `addr` forever, hijacking each `CONNECT` request
/// into a raw byte bridge via `dialer`.
pub async fn run(addr: &str, dialer: Arc<dyn Dialer>) -> Result<()> {
    let listener = TcpListener::bind(addr).await.map_err(Error::Io)?;
    loop {
        let (sock, peer) = listener.accept().await.map_err(Error::Io)?;
        let dialer = Arc::clone(&dialer);
        tokio::spawn(async move {
            if let Err(e) = serve_one(sock, dialer).await {
                debug!(peer = %peer, error = %e, "HTTP CONNECT: connection ended");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connect_request_line() {
        let target = parse_connect_target(b"CONNECT example.com:443 HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(target, "example.com:443");
    }

    #[test]
    fn rejects_non_connect_methods() {
        assert!(parse_connect_target(b"GET / HTTP/1.1\r\n\r\n").is_err());
    }

    #[test]
    fn finds_header_delimiter() {
        assert_eq!(find_subslice(b"abc\r\n\r\ndef", b"\r\n\r\n"), Some(3));
        assert_eq!(find_subslice(b"abcdef", b"\r\n\r\n"), None);
    }
}
