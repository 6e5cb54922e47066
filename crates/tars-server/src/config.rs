//! Server configuration.
//!
//! Loaded from TOML and passed explicitly to the components that need it:
//!
//! ```toml
//! [server]
//! app = "Demo"
//! server = "EchoServer"
//! node = "tars.tarsnode.ServerObj@tcp -h 127.0.0.1 -p 19386"
//! local_ip = "127.0.0.1"
//!
//! [[server.adapters]]
//! name = "Demo.EchoServer.EchoObjAdapter"
//! endpoint = "tcp -h 127.0.0.1 -p 9000 -t 60000"
//! servant = "Demo.EchoServer.EchoObj"
//!
//! [client]
//! stat = "tars.tarsstat.StatObj@tcp -h 127.0.0.1 -p 18888"
//! property = "tars.tarsproperty.PropertyObj@tcp -h 127.0.0.1 -p 18889"
//! report_interval_ms = 60000
//!
//! [monitor]
//! collectors = ["WorkerNumCollector", "ServiceMemoryCollector"]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tars_common::transport::Endpoint;
use tars_stat::StatConfig;

use crate::error::{Result, ServerError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server: ServerProperties,
    #[serde(default)]
    pub client: ClientProperties,
    #[serde(default)]
    pub monitor: MonitorProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerProperties {
    pub app: String,
    pub server: String,
    /// Node agent locator. Empty disables monitor reporting and keep-alive.
    #[serde(default)]
    pub node: String,
    #[serde(default = "default_local_ip")]
    pub local_ip: String,
    /// Send application error details back to callers.
    #[serde(default)]
    pub expose_errors: bool,
    #[serde(default)]
    pub adapters: Vec<AdapterConfig>,
}

fn default_local_ip() -> String {
    "127.0.0.1".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub servant: String,
}

impl AdapterConfig {
    pub fn endpoint(&self) -> Result<Endpoint> {
        self.endpoint
            .parse()
            .map_err(|e| ServerError::Config(format!("adapter {}: {}", self.name, e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientProperties {
    /// Stat service locator. Empty disables call statistics.
    pub stat: String,
    /// Property service locator. Empty disables monitor reporting.
    pub property: String,
    pub report_interval_ms: u64,
    pub keep_alive_interval_ms: u64,
    /// Timeout for calls to the reporting services.
    pub sync_invoke_timeout_ms: u64,
    #[serde(flatten)]
    pub stat_table: StatConfig,
}

impl Default for ClientProperties {
    fn default() -> Self {
        Self {
            stat: String::new(),
            property: String::new(),
            report_interval_ms: 60_000,
            keep_alive_interval_ms: 10_000,
            sync_invoke_timeout_ms: 3_000,
            stat_table: StatConfig::default(),
        }
    }
}

impl ClientProperties {
    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms.max(1))
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms.max(1))
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_invoke_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorProperties {
    pub collectors: Vec<String>,
}

impl Default for MonitorProperties {
    fn default() -> Self {
        Self {
            collectors: vec!["WorkerNumCollector".to_string(), "ServiceMemoryCollector".to_string()],
        }
    }
}

impl ServerConfig {
    pub fn from_toml(s: &str) -> Result<Self> {
        let config: ServerConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.server.app.is_empty() || self.server.server.is_empty() {
            return Err(ServerError::Config("server.app and server.server are required".into()));
        }
        for adapter in &self.server.adapters {
            adapter.endpoint()?;
        }
        Ok(())
    }

    /// `app.server`.
    pub fn server_name(&self) -> String {
        format!("{}.{}", self.server.app, self.server.server)
    }

    /// The first TCP adapter in declaration order.
    ///
    /// Only this adapter serves the registered servants; later TCP adapters
    /// are ignored.
    pub fn first_tcp_adapter(&self) -> Result<(&AdapterConfig, Endpoint)> {
        for adapter in &self.server.adapters {
            let endpoint = adapter.endpoint()?;
            if endpoint.is_tcp() {
                return Ok((adapter, endpoint));
            }
        }
        Err(ServerError::NoTcpAdapter)
    }

    pub fn node_endpoint(&self) -> Result<Option<Endpoint>> {
        locator_endpoint(&self.server.node)
    }

    pub fn stat_endpoint(&self) -> Result<Option<Endpoint>> {
        locator_endpoint(&self.client.stat)
    }

    pub fn property_endpoint(&self) -> Result<Option<Endpoint>> {
        locator_endpoint(&self.client.property)
    }
}

/// Parses `Servant.Name@tcp -h host -p port` or a bare endpoint.
fn locator_endpoint(locator: &str) -> Result<Option<Endpoint>> {
    let locator = locator.trim();
    if locator.is_empty() {
        return Ok(None);
    }
    let endpoint = match locator.split_once('@') {
        Some((_, endpoint)) => endpoint,
        None => locator,
    };
    endpoint
        .parse()
        .map(Some)
        .map_err(|e| ServerError::Config(format!("locator '{}': {}", locator, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
[server]
app = "Demo"
server = "EchoServer"
node = "tars.tarsnode.ServerObj@tcp -h 127.0.0.1 -p 19386"

[[server.adapters]]
name = "Demo.EchoServer.UdpAdapter"
endpoint = "udp -h 127.0.0.1 -p 9001"

[[server.adapters]]
name = "Demo.EchoServer.EchoObjAdapter"
endpoint = "tcp -h 127.0.0.1 -p 9000"
servant = "Demo.EchoServer.EchoObj"

[[server.adapters]]
name = "Demo.EchoServer.OtherAdapter"
endpoint = "tcp -h 127.0.0.1 -p 9002"

[client]
stat = "tars.tarsstat.StatObj@tcp -h 127.0.0.1 -p 18888"
report_interval_ms = 5000
stale_windows = 5
"#;

    #[test]
    fn test_parse_config() {
        let config = ServerConfig::from_toml(CONFIG).unwrap();
        assert_eq!(config.server_name(), "Demo.EchoServer");
        assert_eq!(config.server.local_ip, "127.0.0.1");
        assert!(!config.server.expose_errors);
        assert_eq!(config.client.report_interval(), Duration::from_secs(5));
        assert_eq!(config.client.keep_alive_interval(), Duration::from_secs(10));
        assert_eq!(config.client.stat_table.stale_windows, 5);
        assert_eq!(config.monitor, MonitorProperties::default());
    }

    #[test]
    fn test_first_tcp_adapter_follows_declaration_order() {
        let config = ServerConfig::from_toml(CONFIG).unwrap();
        for _ in 0..3 {
            let (adapter, endpoint) = config.first_tcp_adapter().unwrap();
            assert_eq!(adapter.name, "Demo.EchoServer.EchoObjAdapter");
            assert_eq!(endpoint.port, 9000);
        }
    }

    #[test]
    fn test_no_tcp_adapter() {
        let config = ServerConfig::from_toml(
            r#"
[server]
app = "Demo"
server = "S"
"#,
        )
        .unwrap();
        assert!(matches!(config.first_tcp_adapter(), Err(ServerError::NoTcpAdapter)));
    }

    #[test]
    fn test_locators() {
        let config = ServerConfig::from_toml(CONFIG).unwrap();
        assert_eq!(config.node_endpoint().unwrap().unwrap().port, 19386);
        assert_eq!(config.stat_endpoint().unwrap().unwrap().port, 18888);
        assert!(config.property_endpoint().unwrap().is_none());
    }

    #[test]
    fn test_invalid_adapter_endpoint_is_rejected() {
        let result = ServerConfig::from_toml(
            r#"
[server]
app = "Demo"
server = "S"

[[server.adapters]]
name = "bad"
endpoint = "tcp -h 127.0.0.1"
"#,
        );
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[test]
    fn test_missing_server_name() {
        assert!(ServerConfig::from_toml("[server]\napp = \"\"\nserver = \"\"\n").is_err());
        assert!(matches!(ServerConfig::from_toml("[server\n"), Err(ServerError::Toml(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.app, "Demo");

        assert!(matches!(
            ServerConfig::from_file("/nonexistent/server.toml"),
            Err(ServerError::Io(_))
        ));
    }
}
