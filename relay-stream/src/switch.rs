//! `Switch`: a full-duplex pump between two ports. Not responsible for
//! closing either port, only for moving traffic and reporting which side
//! failed first. Grounded in `original_source/core/switch.go`.

use std::sync::Arc;

use tracing::debug;

use crate::port::Port;

/// Pumps `in_port.unpack()` into `out_port.pack()` until either direction
/// errors, then returns which side failed. The caller's two
/// [`run`](Switch::run) tasks together model the original's two goroutines;
/// `Switch::run` itself just drives one direction so callers can `tokio::join!`
/// both halves (see `relay-daemon`, which owns the port lifetimes).
pub struct Switch;

impl Switch {
    /// Runs both directions of a two-port switch concurrently and returns
    /// once both pumps have stopped. Mirrors the original's
    /// `SimpleSwitch.Run`, which waits on two goroutines via two `done`
    /// channels.
    pub async fn run(port0: Arc<dyn Port>, port1: Arc<dyn Port>) {
        let fwd = Self::pump(Arc::clone(&port0), Arc::clone(&port1));
        let rev = Self::pump(port1, port0);
        tokio::join!(fwd, rev);
    }

    /// One direction of the pump: read a message from `in_port`, write it to
    /// `out_port`, repeat until either side errors. Stops (without
    /// propagating the error further) on the first failure, matching the
    /// original's fail-fast, log-and-return behavior. On `in_port`'s EOF/error
    /// it write-closes `out_port` so the peer it's writing to observes a real
    /// FIN; on `out_port`'s failure it read-closes `in_port` so the opposite
    /// pump (reading `in_port` in the other direction) fails fast instead of
    /// idling on a connection nobody drains anymore.
    async fn pump(in_port: Arc<dyn Port>, out_port: Arc<dyn Port>) {
        loop {
            let iov = match in_port.unpack().await {
                Ok(iov) => iov,
                Err(e) => {
                    debug!(error = %e, "switch: read side closed");
                    if let Err(e) = out_port.close_write().await {
                        debug!(error = %e, "switch: close_write on peer failed");
                    }
                    return;
                }
            };
            if let Err(e) = out_port.pack(iov).await {
                debug!(error = %e, "switch: write side closed");
                if let Err(e) = in_port.close_read().await {
                    debug!(error = %e, "switch: close_read on source failed");
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::RawNetPort;
    use relay_passes::IoVec;
    use std::time::Duration;

    async fn raw_port_pair() -> (Arc<dyn Port>, Arc<dyn Port>) {
        let (a, b) = tokio::io::duplex(8192);
        let (a_r, a_w) = tokio::io::split(Box::new(a) as Box<dyn crate::port::AsyncDuplex>);
        let (b_r, b_w) = tokio::io::split(Box::new(b) as Box<dyn crate::port::AsyncDuplex>);
        let pa = RawNetPort::from_halves(a_r, a_w, Duration::from_secs(5));
        let pb = RawNetPort::from_halves(b_r, b_w, Duration::from_secs(5));
        (Arc::new(pa), Arc::new(pb))
    }

    #[tokio::test]
    async fn switch_relays_both_directions_until_close() {
        let (client_a, relay_a) = raw_port_pair().await;
        let (relay_b, client_b) = raw_port_pair().await;

        let switch_task = tokio::spawn(Switch::run(relay_a, relay_b));

        client_a.pack(IoVec::from_slice(b"ping")).await.unwrap();
        let got = client_b.unpack().await.unwrap();
        assert_eq!(got.concat().as_ref(), b"ping");

        client_b.pack(IoVec::from_slice(b"pong")).await.unwrap();
        let got = client_a.unpack().await.unwrap();
        assert_eq!(got.concat().as_ref(), b"pong");

        drop(client_a);
        drop(client_b);
        let _ = tokio::time::timeout(Duration::from_secs(2), switch_task).await;
    }
}
