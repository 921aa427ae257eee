#![forbid(unsafe_code)]

//! `bxr`: the relay's single binary entry point. One process is one hop:
//! an endpoint if `--next` (and any configured `next` in `--config`) is
//! empty, otherwise an intermediate forwarding to one of those next hops.
//! Grounded in `nyx-cli`'s `clap`-derive argument surface and
//! `nyx-daemon`'s `tracing_subscriber::fmt()` initialization, per
//! SPEC_FULL.md §11/§12.

use std::path::PathBuf;

use clap::Parser;
use relay_core::RelayConfig;

/// A chainable, obfuscated traffic relay hop.
#[derive(Debug, Parser)]
#[command(name = "bxr", version, about)]
struct Cli {
    /// TCP address this hop listens on for SOCKS5 (and, at an endpoint, the
    /// intrinsic protocol) connections.
    #[arg(long)]
    listen: Option<String>,
    /// Optional UDP address for SOCKS5 `UDP ASSOCIATE` support.
    #[arg(long = "listen-udp")]
    listen_udp: Option<String>,
    /// Optional HTTP CONNECT front-end address.
    #[arg(long = "http-proxy")]
    http_proxy: Option<String>,
    /// Comma-separated next-hop addresses. Omit entirely to run as an
    /// egress endpoint.
    #[arg(long, value_delimiter = ',')]
    next: Option<Vec<String>>,
    /// Named frame protocol: `raw`, `variant`, or `http` (default).
    #[arg(long)]
    protocol: Option<String>,
    /// Number of multiplexed TCP routers opened per next hop for UDP relay.
    #[arg(long = "num-udp-mux")]
    num_udp_mux: Option<usize>,
    /// Optional TOML config file, overlaid by the flags above.
    #[arg(long)]
    config: Option<PathBuf>,
    /// `tracing`/`RUST_LOG`-style level filter, used when `RUST_LOG` is unset.
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

impl Cli {
    /// Loads the optional config file, then overlays every flag the caller
    /// actually passed (CLI wins over file, file wins over built-in
    /// defaults).
    fn into_config(self) -> anyhow::Result<RelayConfig> {
        let mut cfg = RelayConfig::load(self.config.as_deref())?;
        if let Some(listen) = self.listen {
            cfg.listen = listen;
        }
        if let Some(listen_udp) = self.listen_udp {
            cfg.listen_udp = listen_udp;
        }
        if let Some(http_proxy) = self.http_proxy {
            cfg.http_proxy = http_proxy;
        }
        if let Some(next) = self.next {
            cfg.next = next;
        }
        if let Some(protocol) = self.protocol {
            cfg.protocol = protocol;
        }
        if let Some(num_udp_mux) = self.num_udp_mux {
            cfg.num_udp_mux = num_udp_mux;
        }
        if let Some(log_level) = self.log_level {
            cfg.log_level = log_level;
        }
        Ok(cfg)
    }
}

fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = cli.into_config()?;
    init_tracing(&cfg.log_level);

    tracing::info!(
        listen = %cfg.listen,
        endpoint = cfg.is_endpoint(),
        protocol = %cfg.protocol,
        "bxr starting"
    );
    relay_daemon::run(cfg).await?;
    Ok(())
}
