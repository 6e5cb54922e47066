use async_trait::async_trait;
use tars_common::{TarsReader, TarsStream};
use tokio_util::sync::CancellationToken;

use crate::registry::{Current, Servant, ServantError};

/// Version reported by `getVersion` and `tars.viewversion`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Built-in administrative servant, registered as `{server}.AdminObj`.
///
/// Methods:
/// - `ping`: empty response, for liveness checks
/// - `getVersion`: string at tag 0
/// - `notify(string command)`: acknowledgement string at tag 0
/// - `shutdown`: stops the server after answering
pub struct AdminServant {
    server_name: String,
    shutdown: CancellationToken,
}

impl AdminServant {
    pub const METHODS: &'static [&'static str] = &["ping", "getVersion", "notify", "shutdown"];

    pub fn new(server_name: impl Into<String>, shutdown: CancellationToken) -> Self {
        Self {
            server_name: server_name.into(),
            shutdown,
        }
    }

    fn notify(&self, command: &str) -> String {
        match command.trim() {
            "tars.viewversion" => VERSION.to_string(),
            "tars.servername" => self.server_name.clone(),
            "" => "[notify] empty command".to_string(),
            other => format!("[notify] {} received by {}", other, self.server_name),
        }
    }
}

fn string_result(value: &str) -> Vec<u8> {
    let mut out = TarsStream::new();
    out.write_string(0, value);
    out.into_bytes()
}

#[async_trait]
impl Servant for AdminServant {
    async fn invoke(&self, method: &str, current: &Current, payload: &[u8]) -> Result<Vec<u8>, ServantError> {
        match method {
            "ping" => Ok(Vec::new()),
            "getVersion" => Ok(string_result(VERSION)),
            "notify" => {
                let command = TarsReader::new(payload)
                    .read_string(1, false)
                    .map_err(|e| ServantError::Application(e.to_string()))?;
                tracing::info!("Admin notify from {:?}: {}", current.peer, command);
                Ok(string_result(&self.notify(&command)))
            }
            "shutdown" => {
                tracing::info!("Admin shutdown requested by {:?}", current.peer);
                self.shutdown.cancel();
                Ok(Vec::new())
            }
            other => Err(ServantError::Application(format!("unknown admin method {}", other))),
        }
    }
}
