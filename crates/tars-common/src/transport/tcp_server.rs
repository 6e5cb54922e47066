use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::protocol::error::{Result, TarsError};
use crate::transport::codec::{TarsCodec, HEADER_SIZE};

/// Async TCP server that reads Tars frames and hands them to a handler.
///
/// Every accepted connection gets its own task. Frames on a connection are
/// handled one after another; the handler returns the response frame to
/// write back, or `None` when nothing must be sent (one-way requests).
pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    /// Creates a new TCP server bound to the specified address.
    ///
    /// # Arguments
    /// * `bind_addr` - The address to bind to (e.g., "0.0.0.0:9000")
    pub async fn new(bind_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| TarsError::Connection(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        Ok(Self { listener })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| TarsError::Connection(format!("Failed to get local addr: {}", e)))
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// Connections that are already open keep running after shutdown so
    /// in-flight requests can complete.
    pub async fn run_until<F, Fut, S>(&self, handler: F, shutdown: S) -> Result<()>
    where
        F: Fn(Vec<u8>, SocketAddr) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Vec<u8>>> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("TCP server on {:?} stopped accepting", self.listener.local_addr().ok());
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            tracing::debug!("Connection established from {}", peer_addr);

            let handler = handler.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler).await {
                    tracing::error!("Connection {} closed with error: {}", peer_addr, e);
                }
            });
        }
    }
}

/// Handles frames on one connection until the peer closes it.
async fn handle_connection<F, Fut>(mut stream: TcpStream, peer_addr: SocketAddr, handler: Arc<F>) -> Result<()>
where
    F: Fn(Vec<u8>, SocketAddr) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Vec<u8>>> + Send + 'static,
{
    loop {
        let mut header = [0u8; HEADER_SIZE];
        match stream.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                tracing::debug!("Connection closed by peer {}", peer_addr);
                return Ok(());
            }
            Err(e) => {
                return Err(TarsError::Connection(format!("Failed to read length: {}", e)));
            }
        }

        // A bad length header leaves no way to find the next frame boundary,
        // so this is the one protocol error that ends the connection.
        let len = TarsCodec::frame_length(header)?;

        let mut frame = vec![0u8; len];
        frame[..HEADER_SIZE].copy_from_slice(&header);
        stream
            .read_exact(&mut frame[HEADER_SIZE..])
            .await
            .map_err(|e| TarsError::Connection(format!("Failed to read frame: {}", e)))?;

        if let Some(response) = handler(frame, peer_addr).await {
            stream
                .write_all(&response)
                .await
                .map_err(|e| TarsError::Connection(format!("Failed to send response: {}", e)))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RequestPacket, ResponsePacket};
    use crate::transport::TcpTransport;

    #[tokio::test]
    async fn test_tcp_server_creation() {
        let server = TcpServer::new("127.0.0.1:0").await;
        assert!(server.is_ok());
        assert!(server.unwrap().local_addr().is_ok());
    }

    #[tokio::test]
    async fn test_server_answers_and_stops() {
        let server = TcpServer::new("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            server
                .run_until(
                    |frame, _peer| async move {
                        let request = TarsCodec::decode_request(&frame).ok()?;
                        let response = ResponsePacket::success(&request, request.buffer.clone());
                        TarsCodec::encode_response(&response).ok()
                    },
                    async {
                        let _ = stop_rx.await;
                    },
                )
                .await
        });

        let transport = TcpTransport::new();
        let mut stream = transport.connect(&addr).await.unwrap();
        for i in 1..=3 {
            let request = RequestPacket::new("A.B.C", "echo", vec![i]).with_request_id(i as i32);
            let response = transport.send_request(&mut stream, &request).await.unwrap();
            assert_eq!(response.request_id, i as i32);
            assert_eq!(response.buffer, vec![i]);
        }

        stop_tx.send(()).unwrap();
        assert!(task.await.unwrap().is_ok());
    }
}
