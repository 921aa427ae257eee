#![forbid(unsafe_code)]

//! The intrinsic relay protocol: a CBOR envelope a near-end `ClientContext`
//! opens against a next hop to ask it to bridge a TCP connection or relay a
//! UDP flow, and the `Server` that answers those requests. Grounded in
//! `original_source/intrinsic/{client,server}.go`.

pub mod client;
pub mod codec;
pub mod messages;
pub mod server;

pub use client::{ClientContext, DirectInternalDialer, InternalDialer};
pub use codec::UdpDispatchCodec;
pub use messages::{Intrinsic, TcpRequest, UdpMessage, RELAY_TCP, RELAY_UDP};
pub use server::Server;
