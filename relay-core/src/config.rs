//! Relay configuration: a flat TOML document overlaid by CLI flags.
//!
//! Unlike the teacher workspace's `nyx-core::config`, this loader does not
//! watch the file for changes; see SPEC_FULL.md Open Questions #1. The
//! relay is reconfigured by restart, consistent with its "no state across
//! restarts" non-goal.

use serde::Deserialize;
use std::path::Path;

use crate::error::{Error, Result};

fn default_protocol() -> String {
    "http".to_string()
}

fn default_num_udp_mux() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Top-level relay configuration, deserialized from an optional TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// TCP address this hop listens on for SOCKS5 (and, if configured, plain
    /// intrinsic-protocol) connections.
    pub listen: String,
    /// Optional UDP address for SOCKS5 `UDP ASSOCIATE` support. Empty disables it.
    pub listen_udp: String,
    /// Optional HTTP CONNECT front-end address. Empty disables it.
    pub http_proxy: String,
    /// Next-hop addresses. Empty means this instance is an endpoint.
    pub next: Vec<String>,
    /// Named frame protocol: `"raw"`, `"variant"`, or `"http"` (default).
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Number of multiplexed TCP routers the client context opens for UDP relay.
    #[serde(default = "default_num_udp_mux")]
    pub num_udp_mux: usize,
    /// `tracing`/`RUST_LOG`-style level filter applied when none is set in the environment.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen: "localhost:1080".to_string(),
            listen_udp: String::new(),
            http_proxy: String::new(),
            next: Vec::new(),
            protocol: default_protocol(),
            num_udp_mux: default_num_udp_mux(),
            log_level: default_log_level(),
        }
    }
}

impl RelayConfig {
    /// Parses a `RelayConfig` from a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Loads configuration from a file path. Returns the default configuration
    /// if `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(Self::default()),
            Some(p) => {
                let data = std::fs::read_to_string(p).map_err(Error::Io)?;
                Self::from_toml_str(&data)
            }
        }
    }

    /// True when this instance has no configured next hop, i.e. it is the
    /// egress endpoint rather than an intermediate hop.
    pub fn is_endpoint(&self) -> bool {
        self.next.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_make_an_endpoint() {
        let cfg = RelayConfig::default();
        assert!(cfg.is_endpoint());
        assert_eq!(cfg.protocol, "http");
        assert_eq!(cfg.num_udp_mux, 4);
    }

    #[test]
    fn parses_partial_toml() {
        let cfg = RelayConfig::from_toml_str(
            r#"
            listen = "0.0.0.0:1080"
            next = ["hop1:9000", "hop2:9000"]
            protocol = "variant"
            "#,
        )
        .expect("valid toml");
        assert_eq!(cfg.listen, "0.0.0.0:1080");
        assert_eq!(cfg.next.len(), 2);
        assert!(!cfg.is_endpoint());
        assert_eq!(cfg.protocol, "variant");
        assert_eq!(cfg.num_udp_mux, 4);
    }

    #[test]
    fn load_missing_path_returns_error() {
        let err = RelayConfig::load(Some(Path::new("/nonexistent/relay.toml"))).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
