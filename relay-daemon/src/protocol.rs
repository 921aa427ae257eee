//! Maps a hop's configured protocol name to a [`Protocol`] factory.
//!
//! `"raw"` disables framing entirely (the factory returns `None`, so callers
//! fall back to a [`relay_stream::RawNetPort`]); `"variant"` builds a
//! [`VariantProtocol`] over LV and HTTP; anything else (including the
//! default, `"http"`) builds an `HttpProtocol` with a pass pipeline applied,
//! per SPEC_FULL.md §4.10/§4.11. Grounded in
//! `original_source/relayer/relayer.go`'s protocol-name switch.

use std::sync::Arc;

use relay_passes::pass::{PassManager, PassManagerBuilder};
use relay_passes::{ByteSwapPass, OBFSDecoder, OBFSEncoder};
use relay_stream::{HttpProtocol, LvProtocol, Protocol, ProtocolWithPass, VariantProtocol};

/// A fresh `(pack, unpack)` pass pipeline applied to every frame of the
/// default `"http"` hop protocol: byte-swap the payload, then pad and
/// re-swap it via `OBFS`.
fn default_pass_pipeline() -> (PassManager, PassManager) {
    let mut builder = PassManagerBuilder::new();
    builder.add_paired_passes(Box::new(ByteSwapPass), Box::new(ByteSwapPass));
    builder.add_paired_passes(Box::new(OBFSEncoder), Box::new(OBFSDecoder));
    builder.build_pack_and_unpack()
}

fn build_variant_protocol() -> VariantProtocol {
    VariantProtocol::new()
        .add(Box::new(LvProtocol))
        .add(Box::new(HttpProtocol))
}

fn build_http_with_passes() -> ProtocolWithPass {
    let (pack_passes, unpack_passes) = default_pass_pipeline();
    ProtocolWithPass {
        protocol: Box::new(HttpProtocol),
        pack_passes,
        unpack_passes,
    }
}

/// Builds the `Fn() -> Option<Box<dyn Protocol>>` factory a
/// [`relay_intrinsic::ClientContext`] (and this crate's own accept loops)
/// use to frame every new connection. A factory, not a single instance,
/// because `VariantProtocol`'s random index draw and the pass pipeline's
/// RNG draws must be independent per connection.
pub fn protocol_factory(name: &str) -> Arc<dyn Fn() -> Option<Box<dyn Protocol>> + Send + Sync> {
    match name {
        "raw" => Arc::new(|| None),
        "variant" => Arc::new(|| Some(Box::new(build_variant_protocol()) as Box<dyn Protocol>)),
        _ => Arc::new(|| Some(Box::new(build_http_with_passes()) as Box<dyn Protocol>)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_factory_disables_framing() {
        let factory = protocol_factory("raw");
        assert!(factory().is_none());
    }

    #[test]
    fn variant_and_http_factories_enable_framing() {
        assert!(protocol_factory("variant")().is_some());
        assert!(protocol_factory("http")().is_some());
        assert!(protocol_factory("anything-else")().is_some());
    }
}
