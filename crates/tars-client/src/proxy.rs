use std::time::Duration;

use tars_common::protocol::error::{Result, TarsError};
use tars_common::transport::{Endpoint, TcpTransport};
use tars_common::{RequestPacket, TarsReader, TarsStream};

/// Default timeout for calls to the reporting services.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(3000);

/// Untyped caller for one remote servant.
///
/// Opens a fresh TCP connection for each call, so concurrent reports never
/// queue behind each other on a shared stream.
#[derive(Debug, Clone)]
pub struct ServantProxy {
    servant_name: String,
    addr: String,
    timeout: Duration,
    transport: TcpTransport,
}

impl ServantProxy {
    pub fn new(servant_name: impl Into<String>, endpoint: &Endpoint) -> Result<Self> {
        if !endpoint.is_tcp() {
            return Err(TarsError::InvalidEndpoint(format!(
                "{} endpoints are not supported: {}",
                endpoint.transport, endpoint
            )));
        }
        Ok(Self {
            servant_name: servant_name.into(),
            addr: endpoint.address(),
            timeout: DEFAULT_CALL_TIMEOUT,
            transport: TcpTransport::new(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn servant_name(&self) -> &str {
        &self.servant_name
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Calls `func` with the already encoded arguments and returns the `int`
    /// result found at tag 0 of the response body.
    ///
    /// A non-zero status in the response envelope becomes
    /// [`TarsError::Remote`].
    pub async fn invoke_int(&self, func: &str, args: TarsStream) -> Result<i32> {
        let request = RequestPacket::new(self.servant_name.clone(), func, args.into_bytes()).with_timeout(self.timeout);

        tracing::debug!(
            "Calling {}::{} at {} (request {})",
            self.servant_name,
            func,
            self.addr,
            request.request_id
        );

        let response = self
            .transport
            .invoke(&self.addr, &request)
            .await?
            .ok_or_else(|| TarsError::InvalidResponse("No response to a two-way call".to_string()))?;

        if !response.is_success() {
            return Err(TarsError::Remote {
                code: response.ret,
                message: response.result_desc,
            });
        }

        TarsReader::new(&response.buffer).read_i32(0, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_creation() {
        let endpoint: Endpoint = "tcp -h 127.0.0.1 -p 18888".parse().unwrap();
        let proxy = ServantProxy::new("tars.tarsstat.StatObj", &endpoint).unwrap();
        assert_eq!(proxy.addr(), "127.0.0.1:18888");
        assert_eq!(proxy.servant_name(), "tars.tarsstat.StatObj");
    }

    #[test]
    fn test_proxy_rejects_udp() {
        let endpoint: Endpoint = "udp -h 127.0.0.1 -p 18888".parse().unwrap();
        assert!(ServantProxy::new("x", &endpoint).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_an_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let proxy = ServantProxy::new("x", &Endpoint::tcp("127.0.0.1", port))
            .unwrap()
            .with_timeout(Duration::from_millis(500));
        assert!(proxy.invoke_int("f", TarsStream::new()).await.is_err());
    }
}
