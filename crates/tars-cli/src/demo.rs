//! The echo servant served by `tars serve`.

use async_trait::async_trait;
use tars_common::{TarsReader, TarsStream};
use tars_server::{Current, Servant, ServantError};

/// Service name the echo servant is registered under.
pub const ECHO_SERVICE: &str = "EchoObj";

/// `echo(string) -> string`: returns its tag 1 argument at tag 0.
#[derive(Debug, Default)]
pub struct EchoServant;

impl EchoServant {
    pub const METHODS: &'static [&'static str] = &["echo"];
}

#[async_trait]
impl Servant for EchoServant {
    async fn invoke(&self, method: &str, current: &Current, payload: &[u8]) -> Result<Vec<u8>, ServantError> {
        match method {
            "echo" => {
                let text = TarsReader::new(payload)
                    .read_string(1, false)
                    .map_err(|e| ServantError::Application(e.to_string()))?;
                tracing::debug!("echo {} bytes for request {}", text.len(), current.request_id);
                let mut out = TarsStream::new();
                out.write_string(0, &text);
                Ok(out.into_bytes())
            }
            other => Err(ServantError::Application(format!("unknown method {}", other))),
        }
    }
}
