use thiserror::Error;

use super::requests::RequestPacket;
use super::responses::ResponsePacket;

#[derive(Error, Debug)]
pub enum TarsError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Remote call failed with status {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<std::net::AddrParseError> for TarsError {
    fn from(err: std::net::AddrParseError) -> Self {
        TarsError::InvalidEndpoint(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TarsError>;

/// A request that could not be decoded or routed.
///
/// Carries whatever part of the request packet was parsed before the failure
/// so the connection handler can still answer with a correlated response.
/// When the request id was not reached it is `0`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} (status {code})")]
pub struct ProtocolFailure {
    packet: Box<RequestPacket>,
    message: String,
    code: i32,
}

impl ProtocolFailure {
    pub fn new(packet: RequestPacket, message: impl Into<String>, code: i32) -> Self {
        Self {
            packet: Box::new(packet),
            message: message.into(),
            code,
        }
    }

    pub fn packet(&self) -> &RequestPacket {
        &self.packet
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    /// Converts the failure into the response sent back to the caller.
    pub fn to_response(&self) -> ResponsePacket {
        ResponsePacket::error(&self.packet, self.code, self.message.clone())
    }
}
