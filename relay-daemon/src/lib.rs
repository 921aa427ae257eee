#![forbid(unsafe_code)]

//! Relayer orchestration (spec.md §4.10): ties the framed transport, pass
//! pipeline, router, SOCKS5 server, and intrinsic protocol together into a
//! runnable hop that is either an **endpoint** (terminates the tunnel,
//! performs real egress) or an **intermediate** (forwards to a next hop,
//! fronted by SOCKS5, optional SOCKS5-UDP, and an optional HTTP CONNECT
//! front-end). Grounded in `original_source/relayer/relayer.go`.

pub mod endpoint;
pub mod http_connect;
pub mod intermediate;
pub mod next_hop;
pub mod protocol;

use relay_core::error::Result;
use relay_core::RelayConfig;

/// Runs this process's relayer according to `cfg`: an endpoint if no next
/// hop is configured, otherwise an intermediate hop. Returns only on a fatal
/// listener failure.
pub async fn run(cfg: RelayConfig) -> Result<()> {
    if cfg.is_endpoint() {
        let protocol_factory = protocol::protocol_factory(&cfg.protocol);
        endpoint::run(&cfg.listen, protocol_factory).await
    } else {
        intermediate::run(&cfg).await
    }
}
