//! Tars response envelope and status codes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::requests::{MessageType, PacketType, RequestId, RequestPacket, TARS_VERSION};

/// Response status codes understood by the server core.
///
/// Application-defined codes travel as [`Status::Other`] and are passed
/// through unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    DecodeError,
    EncodeError,
    MethodNotFound,
    ServantNotFound,
    InvokeTimeout,
    ApplicationError,
    Other(i32),
}

impl Status {
    pub const fn code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::DecodeError => -1,
            Status::EncodeError => -2,
            Status::MethodNotFound => -3,
            Status::ServantNotFound => -4,
            Status::InvokeTimeout => -7,
            Status::ApplicationError => -99,
            Status::Other(code) => code,
        }
    }

    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Status::Ok,
            -1 => Status::DecodeError,
            -2 => Status::EncodeError,
            -3 => Status::MethodNotFound,
            -4 => Status::ServantNotFound,
            -7 => Status::InvokeTimeout,
            -99 => Status::ApplicationError,
            other => Status::Other(other),
        }
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> Self {
        status.code()
    }
}

/// A response envelope as it travels on the wire.
///
/// # Fields
///
/// - `request_id`: always equal to the id of the originating request
/// - `ret`: status code, `0` on success
/// - `buffer`: encoded return value (empty on failure)
/// - `result_desc`: error description (empty on success)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePacket {
    pub version: i16,
    pub packet_type: PacketType,
    pub request_id: RequestId,
    pub message_type: MessageType,
    pub ret: i32,
    pub buffer: Vec<u8>,
    pub status: BTreeMap<String, String>,
    pub result_desc: String,
    pub context: BTreeMap<String, String>,
}

impl Default for ResponsePacket {
    fn default() -> Self {
        Self {
            version: TARS_VERSION,
            packet_type: PacketType::Normal,
            request_id: 0,
            message_type: MessageType::NULL,
            ret: 0,
            buffer: Vec::new(),
            status: BTreeMap::new(),
            result_desc: String::new(),
            context: BTreeMap::new(),
        }
    }
}

impl ResponsePacket {
    fn answering(request: &RequestPacket) -> Self {
        Self {
            version: request.version,
            packet_type: request.packet_type,
            request_id: request.request_id,
            message_type: request.message_type,
            context: request.context.clone(),
            ..Self::default()
        }
    }

    /// Creates a successful response to `request` carrying `buffer`.
    pub fn success(request: &RequestPacket, buffer: Vec<u8>) -> Self {
        Self {
            buffer,
            ..Self::answering(request)
        }
    }

    /// Creates a failed response to `request`.
    pub fn error(request: &RequestPacket, code: i32, desc: impl Into<String>) -> Self {
        Self {
            ret: code,
            result_desc: desc.into(),
            ..Self::answering(request)
        }
    }

    pub fn status_code(&self) -> Status {
        Status::from_code(self.ret)
    }

    pub fn is_success(&self) -> bool {
        self.ret == 0
    }
}
