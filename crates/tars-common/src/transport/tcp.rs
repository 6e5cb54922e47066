use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::protocol::error::{Result, TarsError};
use crate::protocol::{RequestPacket, ResponsePacket};
use crate::transport::codec::{TarsCodec, HEADER_SIZE};

/// Default timeout for connecting to a peer (5 seconds).
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Async TCP transport for Tars frames.
///
/// Used by the reporting clients and by tests that talk to a running server.
/// Each frame is `[4-byte length incl. header] [TLV packet]`.
///
/// # Example
///
/// ```no_run
/// use tars_common::transport::TcpTransport;
/// use tars_common::protocol::RequestPacket;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = TcpTransport::new();
/// let mut stream = transport.connect("127.0.0.1:9000").await?;
///
/// let request = RequestPacket::new("Demo.Server.AdminObj", "ping", vec![]);
/// let response = transport.send_request(&mut stream, &request).await?;
/// assert!(response.is_success());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }

    /// Connects to a remote endpoint, trying every resolved address.
    pub async fn connect(&self, addr: &str) -> Result<TcpStream> {
        let socket_addrs: Vec<SocketAddr> = tokio::net::lookup_host(addr)
            .await
            .map_err(|e| TarsError::InvalidEndpoint(format!("Invalid address '{}': {}", addr, e)))?
            .collect();

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(socket_addr)).await {
                Ok(Ok(stream)) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Ok(Err(e)) => last_err = Some(e.to_string()),
                Err(_) => last_err = Some(format!("timed out after {}ms", CONNECT_TIMEOUT.as_millis())),
            }
        }

        Err(TarsError::Connection(format!(
            "Failed to connect to {}: {}",
            addr,
            last_err.unwrap_or_else(|| "no address resolved".to_string())
        )))
    }

    /// Sends a request and waits for the matching response.
    ///
    /// The caller bounds the wait with its own timeout; see [`TcpTransport::invoke`].
    pub async fn send_request(&self, stream: &mut TcpStream, request: &RequestPacket) -> Result<ResponsePacket> {
        let encoded = TarsCodec::encode_request(request)?;
        Self::send_message(stream, &encoded).await?;

        let frame = Self::receive_message(stream).await?;
        let response = TarsCodec::decode_response(&frame)?;

        if response.request_id != request.request_id {
            return Err(TarsError::InvalidResponse(format!(
                "Response id {} does not match request id {}",
                response.request_id, request.request_id
            )));
        }
        Ok(response)
    }

    /// Connects, sends `request` and waits for the response within the
    /// request's own timeout.
    ///
    /// One-way requests return `Ok(None)` as soon as the frame is written.
    pub async fn invoke(&self, addr: &str, request: &RequestPacket) -> Result<Option<ResponsePacket>> {
        let timeout = request.timeout;
        let call = async {
            let mut stream = self.connect(addr).await?;
            if request.is_one_way() {
                let encoded = TarsCodec::encode_request(request)?;
                Self::send_message(&mut stream, &encoded).await?;
                return Ok(None);
            }
            self.send_request(&mut stream, request).await.map(Some)
        };

        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| TarsError::Timeout(timeout.as_millis() as u64))?
    }

    /// Writes one complete frame.
    pub async fn send_message(stream: &mut TcpStream, frame: &[u8]) -> Result<()> {
        stream
            .write_all(frame)
            .await
            .map_err(|e| Self::map_io_error(e, "writing frame"))?;
        stream
            .flush()
            .await
            .map_err(|e| Self::map_io_error(e, "flushing stream"))?;
        Ok(())
    }

    /// Reads one complete frame, header included.
    pub async fn receive_message(stream: &mut TcpStream) -> Result<Vec<u8>> {
        let mut header = [0u8; HEADER_SIZE];
        stream
            .read_exact(&mut header)
            .await
            .map_err(|e| Self::map_io_error(e, "reading length header"))?;

        let len = TarsCodec::frame_length(header)?;

        let mut frame = vec![0u8; len];
        frame[..HEADER_SIZE].copy_from_slice(&header);
        stream
            .read_exact(&mut frame[HEADER_SIZE..])
            .await
            .map_err(|e| Self::map_io_error(e, "reading frame body"))?;

        Ok(frame)
    }

    /// Maps IO errors to connection errors where the peer went away.
    fn map_io_error(err: std::io::Error, context: &str) -> TarsError {
        match err.kind() {
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => TarsError::Connection(format!("{}: Connection lost", context)),
            _ => TarsError::Io(err),
        }
    }
}
