//! Tars transport layer.
//!
//! # Architecture
//!
//! - **Transport**: TCP, one task per connection
//! - **Codec**: Tars TLV packets
//! - **Wire Format**: `[4-byte length incl. header, u32 big-endian] + [TLV packet]`
//!
//! # Components
//!
//! - **[`TarsCodec`]**: Encode/decode request and response frames
//! - **[`TcpTransport`]**: Async client side (reporting clients, tests, CLI)
//! - **[`TcpServer`]**: Async accept loop feeding frames to a handler
//!
//! # Message Size Limits
//!
//! Frames larger than [`MAX_PACKET_SIZE`] are refused on both sides.

pub mod codec;
pub mod endpoint;
pub mod tcp;
pub mod tcp_server;

pub use codec::{TarsCodec, HEADER_SIZE, MAX_PACKET_SIZE};
pub use endpoint::{Endpoint, TransportKind};
pub use tcp::TcpTransport;
pub use tcp_server::TcpServer;
