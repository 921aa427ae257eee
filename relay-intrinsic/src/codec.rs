//! The UDP routing [`Codec`]: wraps/unwraps router frames as [`UdpMessage`]
//! envelopes. Grounded in `original_source/intrinsic/client.go`'s
//! `UDPDispatcher` (`NewId`/`FreeId`/`Forward`/`Dispatch`): `Forward` is
//! this codec's `encode`, `Dispatch` is its `decode`.
//!
//! Per SPEC_FULL.md Open Questions #2, the id counter lives here and is
//! shared by every [`relay_router::Router`] a [`crate::client::ClientContext`]
//! opens, rather than being reset per router.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use relay_core::error::{Error, Result};
use relay_passes::IoVec;
use relay_router::{Codec, RouteId};

use crate::messages::{decode_cbor, encode_cbor, UdpMessage};

/// Assigns route ids to UDP destinations and encodes/decodes the
/// [`UdpMessage`] envelope that carries a route's address alongside every
/// frame (the far end re-dials per message, so the address rides with the
/// data rather than being negotiated once).
#[derive(Default)]
pub struct UdpDispatchCodec {
    addrs: DashMap<RouteId, String>,
    counter: AtomicU64,
}

impl UdpDispatchCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh route id bound to `addr`. Call [`Self::free_id`]
    /// once the flow using it is torn down.
    pub fn new_id(&self, addr: impl Into<String>) -> RouteId {
        let id = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.addrs.insert(id, addr.into());
        id
    }

    pub fn free_id(&self, id: RouteId) {
        self.addrs.remove(&id);
    }
}

impl Codec for UdpDispatchCodec {
    fn encode(&self, id: RouteId, iov: &mut IoVec) -> Result<()> {
        let addr = self
            .addrs
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::protocol(format!("no remote address registered for route #{id}")))?;
        let msg = UdpMessage {
            id,
            addr,
            data: iov.consume().to_vec(),
        };
        *iov = IoVec::from(encode_cbor(&msg)?);
        Ok(())
    }

    fn decode(&self, iov: &mut IoVec) -> Result<RouteId> {
        let msg: UdpMessage = decode_cbor(&iov.consume())?;
        *iov = IoVec::from(msg.data);
        Ok(msg.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_embeds_registered_address_and_decode_recovers_id() {
        let codec = UdpDispatchCodec::new();
        let id = codec.new_id("8.8.8.8:53");
        let mut iov = IoVec::from_slice(b"query");
        codec.encode(id, &mut iov).unwrap();

        let decoded_id = codec.decode(&mut iov).unwrap();
        assert_eq!(decoded_id, id);
        assert_eq!(iov.concat().as_ref(), b"query");
    }

    #[test]
    fn encode_rejects_unknown_route() {
        let codec = UdpDispatchCodec::new();
        let mut iov = IoVec::from_slice(b"x");
        assert!(codec.encode(999, &mut iov).is_err());
    }

    #[test]
    fn freed_id_is_rejected_by_subsequent_encode() {
        let codec = UdpDispatchCodec::new();
        let id = codec.new_id("1.1.1.1:53");
        codec.free_id(id);
        let mut iov = IoVec::from_slice(b"x");
        assert!(codec.encode(id, &mut iov).is_err());
    }
}
