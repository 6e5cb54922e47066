pub mod error;
pub mod requests;
pub mod responses;
pub mod stream;


pub use error::{ProtocolFailure, Result, TarsError};
pub use requests::{
    generate_request_id, MessageType, PacketType, RequestId, RequestPacket, DEFAULT_TIMEOUT, TARS_VERSION,
};
pub use responses::{ResponsePacket, Status};
pub use stream::{TarsReader, TarsStream, TarsStruct};
