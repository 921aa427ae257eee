//! Next-hop selection: one [`ClientContext`] per configured next-hop
//! address, picked uniformly at random per new connection, per spec.md
//! §4.10 ("Next-hop selection across a list uses uniform random choice per
//! new connection"). Grounded in `original_source/relayer/relayer.go`'s
//! `pickNext`.

use std::sync::Arc;

use rand::Rng;
use relay_core::error::Result;
use relay_intrinsic::{ClientContext, DirectInternalDialer};
use relay_socks5::Dialer;
use relay_stream::port::AsyncDuplex;
use relay_stream::Protocol;

/// Every next-hop address this instance may dial, each wrapped in its own
/// [`ClientContext`] (and therefore its own pool of multiplexed UDP
/// routers).
pub struct NextHopPool {
    contexts: Vec<Arc<ClientContext>>,
}

impl NextHopPool {
    pub fn new(
        next_hops: &[String],
        num_udp_mux: usize,
        protocol_factory: Arc<dyn Fn() -> Option<Box<dyn Protocol>> + Send + Sync>,
    ) -> Self {
        let contexts = next_hops
            .iter()
            .map(|addr| {
                Arc::new(ClientContext::new(
                    addr.clone(),
                    num_udp_mux,
                    Arc::clone(&protocol_factory),
                    Arc::new(DirectInternalDialer),
                ))
            })
            .collect();
        Self { contexts }
    }

    /// Picks one configured next hop uniformly at random. Panics if no next
    /// hops were configured; callers only build a pool when `next` is
    /// non-empty (an empty list means this instance is an endpoint, per
    /// `RelayConfig::is_endpoint`, and never reaches here).
    pub fn pick(&self) -> Arc<ClientContext> {
        let idx = rand::thread_rng().gen_range(0..self.contexts.len());
        Arc::clone(&self.contexts[idx])
    }
}

/// Adapts a [`NextHopPool`] to the [`relay_socks5::Dialer`] trait the SOCKS5
/// server (and the HTTP CONNECT front-end) expect: `"tcp"` opens an
/// intrinsic `RELAY_TCP` bridge, anything else opens a `RELAY_UDP`-routed
/// flow.
pub struct PoolDialer {
    pub pool: Arc<NextHopPool>,
}

#[async_trait::async_trait]
impl Dialer for PoolDialer {
    async fn dial(&self, network: &str, addr: &str) -> Result<Box<dyn AsyncDuplex>> {
        let ctx = self.pool.pick();
        if network.starts_with("udp") {
            ctx.dial_udp(addr).await
        } else {
            ctx.dial_tcp(addr).await
        }
    }
}
