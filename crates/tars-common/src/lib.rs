//! Tars Common Types and Transport
//!
//! This crate provides the wire protocol definitions and TCP transport layer
//! shared by the Tars server core, its reporting clients and the CLI.
//!
//! # Overview
//!
//! - **Protocol Layer**: request/response envelopes, status codes, errors and
//!   the Tars TLV stream
//! - **Transport Layer**: length-prefixed framing over TCP
//!
//! # Architecture
//!
//! - **Transport**: TCP, one task per connection
//! - **Serialization**: Tars TLV (`(tag << 4) | type` head bytes)
//! - **Message Format**: `[4-byte length incl. header as u32 big-endian] + [TLV packet]`
//! - **Max Message Size**: 10 MB
//!
//! # Example
//!
//! ```
//! use tars_common::{RequestPacket, ResponsePacket, Status};
//! use tars_common::transport::TarsCodec;
//!
//! let request = RequestPacket::new("Demo.Server.EchoObj", "echo", b"hi".to_vec());
//! let frame = TarsCodec::encode_request(&request).unwrap();
//!
//! let decoded = TarsCodec::decode_request(&frame).unwrap();
//! let response = ResponsePacket::success(&decoded, decoded.buffer.clone());
//! assert_eq!(response.status_code(), Status::Ok);
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
