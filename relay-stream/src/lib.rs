#![forbid(unsafe_code)]

//! Frame protocols (LV, HTTP, Variant), the `Port` abstractions built on top
//! of them, and the two-port `Switch` that pumps traffic between a pair of
//! ports.

pub mod port;
pub mod protocol;
pub mod switch;
pub mod udp;

pub use port::{AsyncDuplex, NetPort, Port, RawNetPort, SyncPort};
pub use protocol::{HttpProtocol, LvProtocol, Protocol, ProtocolWithPass, VariantProtocol};
pub use switch::Switch;
pub use udp::ConnectedUdpDuplex;
