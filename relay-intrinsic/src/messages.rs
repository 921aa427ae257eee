//! Wire types carried inside every intrinsic envelope. Grounded in
//! `original_source/intrinsic/server.go`'s `Intrinsic`/`TCPRequest`/`UDPMessage`,
//! with `gob` replaced by `ciborium` (CBOR) per SPEC_FULL.md §3/§6.

use relay_core::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Requests the far end dial a UDP destination and relay datagrams back.
pub const RELAY_UDP: u8 = 1;
/// Requests the far end dial a TCP destination and bridge the connection.
pub const RELAY_TCP: u8 = 2;

/// The outermost envelope every intrinsic request opens with. `data` carries
/// a further CBOR-encoded [`TcpRequest`] when `func == RELAY_TCP`; it's empty
/// for `RELAY_UDP`, whose actual per-datagram routing lives in
/// [`UdpMessage`] frames exchanged afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intrinsic {
    #[serde(rename = "func")]
    pub func: u8,
    #[serde(rename = "data")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpRequest {
    pub addr: String,
}

/// One UDP datagram, tagged with the route id its sender's dispatcher
/// assigned and the destination it should be (re)dialed against. Carried in
/// both directions: client -> server to request a relay, server -> client
/// to deliver the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpMessage {
    pub id: u64,
    pub addr: String,
    pub data: Vec<u8>,
}

pub fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| Error::protocol(format!("cbor encode failed: {e}")))?;
    Ok(buf)
}

pub fn decode_cbor<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T> {
    ciborium::from_reader(data).map_err(|e| Error::protocol(format!("cbor decode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intrinsic_round_trips_through_cbor() {
        let req = TcpRequest {
            addr: "example.com:443".to_string(),
        };
        let i = Intrinsic {
            func: RELAY_TCP,
            data: encode_cbor(&req).unwrap(),
        };
        let bytes = encode_cbor(&i).unwrap();
        let back: Intrinsic = decode_cbor(&bytes).unwrap();
        assert_eq!(back.func, RELAY_TCP);
        let back_req: TcpRequest = decode_cbor(&back.data).unwrap();
        assert_eq!(back_req.addr, "example.com:443");
    }

    #[test]
    fn udp_message_round_trips_through_cbor() {
        let msg = UdpMessage {
            id: 42,
            addr: "1.2.3.4:53".to_string(),
            data: b"query".to_vec(),
        };
        let bytes = encode_cbor(&msg).unwrap();
        let back: UdpMessage = decode_cbor(&bytes).unwrap();
        assert_eq!(back.id, 42);
        assert_eq!(back.addr, "1.2.3.4:53");
        assert_eq!(back.data, b"query");
    }
}
