use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tars_common::transport::{Endpoint, TransportKind};
use tars_common::{MessageType, RequestId};
use thiserror::Error;

use crate::admin::AdminServant;
use crate::error::{Result, ServerError};

/// Service identifier of the built-in admin servant.
pub const ADMIN_SERVICE: &str = "AdminObj";

/// Per-call information handed to a servant alongside the payload.
#[derive(Debug, Clone, Default)]
pub struct Current {
    pub request_id: RequestId,
    pub servant_name: String,
    pub func_name: String,
    pub message_type: MessageType,
    pub context: BTreeMap<String, String>,
    pub timeout: Duration,
    pub peer: Option<SocketAddr>,
}

/// Failure returned by a servant method.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServantError {
    /// The method failed. Answered with `APPLICATION_ERROR`.
    #[error("{0}")]
    Application(String),

    /// The method chose its own status code, which is sent back unchanged.
    /// Code `0` is answered as an empty success.
    #[error("status {code}: {message}")]
    Status { code: i32, message: String },
}

/// A named RPC service implementation.
///
/// Payloads are opaque bytes; argument decoding belongs to the servant.
#[async_trait]
pub trait Servant: Send + Sync {
    async fn invoke(&self, method: &str, current: &Current, payload: &[u8]) -> std::result::Result<Vec<u8>, ServantError>;
}

/// Logical `app.server.service` identifier of a servant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceLocator(String);

impl ServiceLocator {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last segment, e.g. `EchoObj` for `Demo.EchoServer.EchoObj`.
    pub fn service(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ServiceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Network endpoint a servant is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerPort {
    pub host: String,
    pub port: u16,
    pub transport: TransportKind,
}

impl From<&Endpoint> for ServerPort {
    fn from(endpoint: &Endpoint) -> Self {
        Self {
            host: endpoint.host.clone(),
            port: endpoint.port,
            transport: endpoint.transport,
        }
    }
}

/// A registered servant.
pub struct ServiceRegistration {
    pub locator: ServiceLocator,
    pub servant: Arc<dyn Servant>,
    pub methods: Vec<String>,
    pub port: ServerPort,
}

impl ServiceRegistration {
    pub fn has_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }
}

impl fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("locator", &self.locator)
            .field("methods", &self.methods)
            .field("port", &self.port)
            .finish()
    }
}

/// Servant name to registration.
///
/// Filled before the server starts accepting and read-only afterwards.
#[derive(Debug, Default)]
pub struct ServantRegistry {
    services: BTreeMap<String, Arc<ServiceRegistration>>,
}

impl ServantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a servant under `name`.
    ///
    /// # Errors
    ///
    /// [`ServerError::DuplicateServant`] when `name` is already taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        locator: ServiceLocator,
        servant: Arc<dyn Servant>,
        methods: &[&str],
        port: ServerPort,
    ) -> Result<()> {
        let name = name.into();
        if self.services.contains_key(&name) {
            return Err(ServerError::DuplicateServant(name));
        }

        tracing::info!("Registered servant {} ({} methods)", name, methods.len());
        self.services.insert(
            name,
            Arc::new(ServiceRegistration {
                locator,
                servant,
                methods: methods.iter().map(|m| m.to_string()).collect(),
                port,
            }),
        );
        Ok(())
    }

    /// Registers `{server_name}.AdminObj` unless some servant already uses
    /// the `AdminObj` service identifier.
    ///
    /// Returns whether a servant was added.
    pub fn ensure_admin_servant(&mut self, server_name: &str, port: ServerPort, admin: AdminServant) -> Result<bool> {
        if self.services.values().any(|s| s.locator.service() == ADMIN_SERVICE) {
            return Ok(false);
        }

        let name = format!("{}.{}", server_name, ADMIN_SERVICE);
        self.register(
            name.clone(),
            ServiceLocator::new(name),
            Arc::new(admin),
            AdminServant::METHODS,
            port,
        )?;
        Ok(true)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ServiceRegistration>> {
        self.services.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    struct Noop;

    #[async_trait]
    impl Servant for Noop {
        async fn invoke(&self, _method: &str, _current: &Current, _payload: &[u8]) -> std::result::Result<Vec<u8>, ServantError> {
            Ok(Vec::new())
        }
    }

    fn port() -> ServerPort {
        ServerPort::from(&Endpoint::tcp("127.0.0.1", 9000))
    }

    fn admin() -> AdminServant {
        AdminServant::new("Demo.EchoServer", CancellationToken::new())
    }

    #[test]
    fn test_locator_service() {
        assert_eq!(ServiceLocator::new("Demo.EchoServer.EchoObj").service(), "EchoObj");
        assert_eq!(ServiceLocator::new("Echo").service(), "Echo");
    }

    #[test]
    fn test_duplicate_servant_rejected() {
        let mut registry = ServantRegistry::new();
        registry
            .register("Foo", ServiceLocator::new("A.B.Foo"), Arc::new(Noop), &["bar"], port())
            .unwrap();
        let err = registry
            .register("Foo", ServiceLocator::new("A.B.Foo"), Arc::new(Noop), &["baz"], port())
            .unwrap_err();
        assert!(matches!(err, ServerError::DuplicateServant(name) if name == "Foo"));
        assert!(registry.get("Foo").unwrap().has_method("bar"));
        assert!(!registry.get("Foo").unwrap().has_method("baz"));
    }

    #[test]
    fn test_ensure_admin_servant_is_idempotent() {
        let mut registry = ServantRegistry::new();
        assert!(registry.ensure_admin_servant("Demo.EchoServer", port(), admin()).unwrap());
        assert!(!registry.ensure_admin_servant("Demo.EchoServer", port(), admin()).unwrap());

        let admins: Vec<_> = registry.names().filter(|n| n.ends_with(ADMIN_SERVICE)).collect();
        assert_eq!(admins, vec!["Demo.EchoServer.AdminObj"]);
        assert!(registry.get("Demo.EchoServer.AdminObj").unwrap().has_method("ping"));
    }

    #[test]
    fn test_declared_admin_servant_is_kept() {
        let mut registry = ServantRegistry::new();
        registry
            .register(
                "Custom.AdminObj",
                ServiceLocator::new("Demo.EchoServer.AdminObj"),
                Arc::new(Noop),
                &["ping"],
                port(),
            )
            .unwrap();

        assert!(!registry.ensure_admin_servant("Demo.EchoServer", port(), admin()).unwrap());
        assert_eq!(registry.len(), 1);
    }
}
