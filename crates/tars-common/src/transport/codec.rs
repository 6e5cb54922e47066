use crate::protocol::error::{ProtocolFailure, Result, TarsError};
use crate::protocol::requests::{PacketType, RequestPacket, TARS_VERSION};
use crate::protocol::responses::{ResponsePacket, Status};
use crate::protocol::stream::{TarsReader, TarsStream};
use std::time::Duration;

/// Size of the length header that starts every frame.
pub const HEADER_SIZE: usize = 4;

/// Maximum frame size, header included (10 MB).
pub const MAX_PACKET_SIZE: usize = 10 * 1024 * 1024;

/// Codec for Tars request and response frames.
///
/// A frame is a 4-byte big-endian length, which counts the header itself,
/// followed by the packet fields in TLV form:
///
/// ```text
/// [total length: u32 BE] [tag 1: version] [tag 2: packet type] ...
/// ```
///
/// # Example
///
/// ```
/// use tars_common::transport::TarsCodec;
/// use tars_common::protocol::{RequestPacket, ResponsePacket};
///
/// let request = RequestPacket::new("App.Server.EchoObj", "ping", b"hi".to_vec());
/// let frame = TarsCodec::encode_request(&request).unwrap();
/// let decoded = TarsCodec::decode_request(&frame).unwrap();
/// assert_eq!(request, decoded);
///
/// let response = ResponsePacket::success(&decoded, b"hi".to_vec());
/// let frame = TarsCodec::encode_response(&response).unwrap();
/// assert_eq!(TarsCodec::decode_response(&frame).unwrap(), response);
/// ```
pub struct TarsCodec;

impl TarsCodec {
    /// Validates a frame header and returns the total frame length.
    pub fn frame_length(header: [u8; HEADER_SIZE]) -> Result<usize> {
        let len = u32::from_be_bytes(header) as usize;
        if len < HEADER_SIZE {
            return Err(TarsError::Decode(format!(
                "Frame length {} is shorter than the {}-byte header",
                len, HEADER_SIZE
            )));
        }
        if len > MAX_PACKET_SIZE {
            return Err(TarsError::Decode(format!(
                "Frame too large: {} bytes (max {} bytes)",
                len, MAX_PACKET_SIZE
            )));
        }
        Ok(len)
    }

    /// Checks the length header of a complete frame and returns the body.
    fn frame_body(frame: &[u8]) -> Result<&[u8]> {
        if frame.len() < HEADER_SIZE {
            return Err(TarsError::Decode(format!(
                "Frame of {} bytes is shorter than the {}-byte header",
                frame.len(),
                HEADER_SIZE
            )));
        }
        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&frame[..HEADER_SIZE]);
        let len = Self::frame_length(header)?;
        if len != frame.len() {
            return Err(TarsError::Decode(format!(
                "Frame length header says {} bytes but frame has {}",
                len,
                frame.len()
            )));
        }
        Ok(&frame[HEADER_SIZE..])
    }

    fn finish_frame(out: TarsStream) -> Result<Vec<u8>> {
        let mut frame = out.into_bytes();
        if frame.len() > MAX_PACKET_SIZE {
            return Err(TarsError::Encode(format!(
                "Frame too large: {} bytes (max {} bytes)",
                frame.len(),
                MAX_PACKET_SIZE
            )));
        }
        let len = (frame.len() as u32).to_be_bytes();
        frame[..HEADER_SIZE].copy_from_slice(&len);
        Ok(frame)
    }

    fn timeout_millis(timeout: Duration) -> i32 {
        i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX)
    }

    /// Encodes a request into a complete frame.
    pub fn encode_request(request: &RequestPacket) -> Result<Vec<u8>> {
        let mut out = TarsStream::with_prefix(&[0u8; HEADER_SIZE]);
        out.write_i16(1, request.version);
        out.write_i8(2, request.packet_type as i8);
        out.write_i32(3, request.message_type.0);
        out.write_i32(4, request.request_id);
        out.write_string(5, &request.servant_name);
        out.write_string(6, &request.func_name);
        out.write_bytes(7, &request.buffer);
        out.write_i32(8, Self::timeout_millis(request.timeout));
        out.write_string_map(9, &request.context);
        out.write_string_map(10, &request.status);
        Self::finish_frame(out)
    }

    /// Decodes a complete request frame.
    ///
    /// The header and the version are validated before anything else is
    /// interpreted. On failure the returned [`ProtocolFailure`] carries the
    /// fields read so far, so a request id that was reached can still be
    /// used to answer the caller.
    pub fn decode_request(frame: &[u8]) -> std::result::Result<RequestPacket, ProtocolFailure> {
        let mut packet = RequestPacket::default();
        let decode_error = |packet: RequestPacket, err: TarsError| {
            ProtocolFailure::new(packet, err.to_string(), Status::DecodeError.code())
        };

        let body = match Self::frame_body(frame) {
            Ok(body) => body,
            Err(e) => return Err(decode_error(packet, e)),
        };
        let mut reader = TarsReader::new(body);

        match reader.read_i16(1, true) {
            Ok(version) => packet.version = version,
            Err(e) => return Err(decode_error(packet, e)),
        }
        if packet.version != TARS_VERSION {
            let message = format!("Unsupported protocol version {}", packet.version);
            return Err(ProtocolFailure::new(packet, message, Status::DecodeError.code()));
        }

        match Self::read_request_fields(&mut reader, &mut packet) {
            Ok(()) => Ok(packet),
            Err(e) => Err(decode_error(packet, e)),
        }
    }

    fn read_request_fields(reader: &mut TarsReader<'_>, packet: &mut RequestPacket) -> Result<()> {
        let packet_type = reader.read_i8(2, true)?;
        packet.packet_type = PacketType::try_from(packet_type)
            .map_err(|t| TarsError::Decode(format!("Unknown packet type {}", t)))?;
        packet.message_type.0 = reader.read_i32(3, true)?;
        packet.request_id = reader.read_i32(4, true)?;
        packet.servant_name = reader.read_string(5, true)?;
        packet.func_name = reader.read_string(6, true)?;
        packet.buffer = reader.read_bytes(7, true)?;
        let timeout = reader.read_i32(8, true)?;
        packet.timeout = Duration::from_millis(timeout.max(0) as u64);
        packet.context = reader.read_string_map(9, false)?;
        packet.status = reader.read_string_map(10, false)?;
        Ok(())
    }

    /// Encodes a response into a complete frame.
    pub fn encode_response(response: &ResponsePacket) -> Result<Vec<u8>> {
        let mut out = TarsStream::with_prefix(&[0u8; HEADER_SIZE]);
        out.write_i16(1, response.version);
        out.write_i8(2, response.packet_type as i8);
        out.write_i32(3, response.request_id);
        out.write_i32(4, response.message_type.0);
        out.write_i32(5, response.ret);
        out.write_bytes(6, &response.buffer);
        out.write_string_map(7, &response.status);
        out.write_string(8, &response.result_desc);
        out.write_string_map(9, &response.context);
        Self::finish_frame(out)
    }

    /// Decodes a complete response frame.
    pub fn decode_response(frame: &[u8]) -> Result<ResponsePacket> {
        let mut reader = TarsReader::new(Self::frame_body(frame)?);
        let version = reader.read_i16(1, true)?;
        if version != TARS_VERSION {
            return Err(TarsError::Decode(format!("Unsupported protocol version {}", version)));
        }
        let packet_type = PacketType::try_from(reader.read_i8(2, true)?)
            .map_err(|t| TarsError::Decode(format!("Unknown packet type {}", t)))?;
        let request_id = reader.read_i32(3, true)?;
        let message_type = reader.read_i32(4, true)?;
        let ret = reader.read_i32(5, true)?;
        let buffer = reader.read_bytes(6, true)?;
        let status = reader.read_string_map(7, false)?;
        let result_desc = reader.read_string(8, false)?;
        let context = reader.read_string_map(9, false)?;

        Ok(ResponsePacket {
            version,
            packet_type,
            request_id,
            message_type: crate::protocol::MessageType(message_type),
            ret,
            buffer,
            status,
            result_desc,
            context,
        })
    }
}
