//! Constants shared by every crate in the relay workspace.

use std::time::Duration;

/// Default read/write timeout for a TCP-backed [`Port`](../relay_stream/port/index.html):
/// 60 minutes, matching the upstream constant this is ported from.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);
/// Default read/write timeout for a UDP-backed port: 60 seconds.
pub const DEFAULT_UDP_TIMEOUT: Duration = Duration::from_secs(60);

/// Initial/standard allocation for a [`RawNetPort`](../relay_stream/port/index.html) read buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 64 << 10;
/// Ceiling a `RawNetPort` read buffer may grow to before it stops doubling.
pub const DEFAULT_BUFFER_LIMIT: usize = 64 << 20;
/// Single-datagram buffer size used by the SOCKS5 UDP path and the intrinsic UDP relay.
pub const DEFAULT_UDP_BUFFER_SIZE: usize = 2 << 10;

/// Safety cap on a single framed message, shared by the LV and HTTP frame formats.
/// `DEFAULT_BUFFER_SIZE * 2`, i.e. ~128 KiB. Some protocol variants (see
/// [`UNUSUAL_BUFFER_LENGTH_THRESHOLD_LARGE`]) raise this to 64 MiB.
pub const UNUSUAL_BUFFER_LENGTH_THRESHOLD: usize = DEFAULT_BUFFER_SIZE * 2;
/// Large-variant frame size cap (used by protocols that expect to carry bulk transfers).
pub const UNUSUAL_BUFFER_LENGTH_THRESHOLD_LARGE: usize = 64 << 20;

/// SOCKS5/handshake-style operations get an 8 second deadline, matching the
/// intrinsic handshake and the SOCKS5 method/negotiation exchange.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(8);

/// Read deadline applied while a SOCKS5 `UDP ASSOCIATE` control connection
/// is held open as the lifetime tether for its UDP association.
pub const UDP_ASSOCIATE_IDLE_TIMEOUT: Duration = Duration::from_secs(600);
