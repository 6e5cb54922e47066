use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub type RequestId = i32;

/// The only protocol version this crate encodes and accepts.
pub const TARS_VERSION: i16 = 1;

/// Timeout applied when a caller does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

static REQUEST_ID_COUNTER: AtomicI32 = AtomicI32::new(1);

/// Whether the caller expects a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i8)]
pub enum PacketType {
    #[default]
    Normal = 0,
    OneWay = 1,
}

impl TryFrom<i8> for PacketType {
    type Error = i8;

    fn try_from(value: i8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(PacketType::Normal),
            1 => Ok(PacketType::OneWay),
            other => Err(other),
        }
    }
}

/// Message flags carried by a packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageType(pub i32);

impl MessageType {
    pub const NULL: MessageType = MessageType(0x00);
    pub const HASH: MessageType = MessageType(0x01);
    pub const GRID: MessageType = MessageType(0x02);
    pub const DYED: MessageType = MessageType(0x04);
    pub const SAMPLE: MessageType = MessageType(0x08);
    pub const ASYNC: MessageType = MessageType(0x10);
    pub const SET_NAME: MessageType = MessageType(0x80);
    pub const TRACE: MessageType = MessageType(0x100);

    pub fn contains(self, flag: MessageType) -> bool {
        self.0 & flag.0 == flag.0
    }

    pub fn with(self, flag: MessageType) -> MessageType {
        MessageType(self.0 | flag.0)
    }
}

/// A request envelope as it travels on the wire.
///
/// `context` carries caller metadata and is echoed back in the response;
/// `status` carries protocol-level hints (set name, dyeing key, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPacket {
    pub version: i16,
    pub packet_type: PacketType,
    pub message_type: MessageType,
    pub request_id: RequestId,
    pub servant_name: String,
    pub func_name: String,
    pub buffer: Vec<u8>,
    pub timeout: Duration,
    pub context: BTreeMap<String, String>,
    pub status: BTreeMap<String, String>,
}

impl Default for RequestPacket {
    fn default() -> Self {
        Self {
            version: TARS_VERSION,
            packet_type: PacketType::Normal,
            message_type: MessageType::NULL,
            request_id: 0,
            servant_name: String::new(),
            func_name: String::new(),
            buffer: Vec::new(),
            timeout: Duration::ZERO,
            context: BTreeMap::new(),
            status: BTreeMap::new(),
        }
    }
}

impl RequestPacket {
    pub fn new(servant_name: impl Into<String>, func_name: impl Into<String>, buffer: Vec<u8>) -> Self {
        Self {
            request_id: generate_request_id(),
            servant_name: servant_name.into(),
            func_name: func_name.into(),
            buffer,
            timeout: DEFAULT_TIMEOUT,
            ..Self::default()
        }
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    /// Sets the call deadline.
    ///
    /// The wire carries whole milliseconds in an `i32`, so the value is
    /// truncated to milliseconds and capped at `i32::MAX` ms.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = wire_timeout(timeout);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn one_way(mut self) -> Self {
        self.packet_type = PacketType::OneWay;
        self
    }

    pub fn is_one_way(&self) -> bool {
        self.packet_type == PacketType::OneWay
    }
}

fn wire_timeout(timeout: Duration) -> Duration {
    Duration::from_millis(timeout.as_millis().min(i32::MAX as u128) as u64)
}

/// Returns the next request id for this process.
///
/// Ids are positive and wrap around before overflowing; `0` is never issued
/// because it is reserved for failures that happen before the id is known.
pub fn generate_request_id() -> RequestId {
    loop {
        let id = REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        if id > 0 {
            return id;
        }
        // Wrapped into the negatives; reset and try again.
        let _ = REQUEST_ID_COUNTER.compare_exchange(id.wrapping_add(1), 1, Ordering::Relaxed, Ordering::Relaxed);
    }
}
