use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tars_client::{
    PropertyFClient, PropertyFServant, ServantProxy, ServerFClient, ServerFServant, ServerInfo, StatFClient,
    StatFServant, NODE_SERVANT, PROPERTY_SERVANT, STAT_SERVANT,
};
use tars_common::transport::{Endpoint, TcpServer};
use tars_stat::Stat;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::admin::AdminServant;
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::monitor::{collector_by_name, Collector, Monitor};
use crate::registry::{Servant, ServantRegistry, ServerPort, ServiceLocator};

/// A Tars server under construction.
///
/// Servants are added before [`TarsServer::start`]; once started the
/// registry is frozen.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tars_server::{Current, Servant, ServantError, ServerConfig, TarsServer};
///
/// struct Echo;
///
/// #[async_trait::async_trait]
/// impl Servant for Echo {
///     async fn invoke(&self, _method: &str, _current: &Current, payload: &[u8]) -> Result<Vec<u8>, ServantError> {
///         Ok(payload.to_vec())
///     }
/// }
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ServerConfig::from_file("config/echo-server.toml")?;
/// let mut server = TarsServer::new(config)?;
/// server.add_servant("EchoObj", Arc::new(Echo), &["echo"])?;
///
/// let handle = server.start().await?;
/// handle.wait().await;
/// # Ok(())
/// # }
/// ```
pub struct TarsServer {
    config: ServerConfig,
    endpoint: Endpoint,
    registry: ServantRegistry,
    stat_client: Option<Arc<dyn StatFServant>>,
    property_client: Option<Arc<dyn PropertyFServant>>,
    node_client: Option<Arc<dyn ServerFServant>>,
    collectors: Vec<Box<dyn Collector>>,
    shutdown: CancellationToken,
}

impl TarsServer {
    /// Builds a server from its configuration.
    ///
    /// The first TCP adapter is the one servants are bound to. Reporting
    /// clients are created for every configured service locator.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let (_, endpoint) = config.first_tcp_adapter()?;
        let timeout = config.client.invoke_timeout();

        let stat_client = config
            .stat_endpoint()?
            .map(|ep| -> Result<Arc<dyn StatFServant>> {
                let proxy = ServantProxy::new(STAT_SERVANT, &ep)?.with_timeout(timeout);
                Ok(Arc::new(StatFClient::with_proxy(proxy)))
            })
            .transpose()?;
        let property_client = config
            .property_endpoint()?
            .map(|ep| -> Result<Arc<dyn PropertyFServant>> {
                let proxy = ServantProxy::new(PROPERTY_SERVANT, &ep)?.with_timeout(timeout);
                Ok(Arc::new(PropertyFClient::with_proxy(proxy)))
            })
            .transpose()?;
        let node_client = config
            .node_endpoint()?
            .map(|ep| -> Result<Arc<dyn ServerFServant>> {
                let proxy = ServantProxy::new(NODE_SERVANT, &ep)?.with_timeout(timeout);
                Ok(Arc::new(ServerFClient::with_proxy(proxy)))
            })
            .transpose()?;

        let server_name = config.server_name();
        let collectors = config
            .monitor
            .collectors
            .iter()
            .map(|name| collector_by_name(name, &server_name))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            endpoint,
            registry: ServantRegistry::new(),
            stat_client,
            property_client,
            node_client,
            collectors,
            shutdown: CancellationToken::new(),
        })
    }

    /// Registers a servant as `{app}.{server}.{service}`.
    pub fn add_servant(&mut self, service: &str, servant: Arc<dyn Servant>, methods: &[&str]) -> Result<&mut Self> {
        let name = format!("{}.{}", self.config.server_name(), service);
        self.registry.register(
            name.clone(),
            ServiceLocator::new(name),
            servant,
            methods,
            ServerPort::from(&self.endpoint),
        )?;
        Ok(self)
    }

    pub fn add_collector(&mut self, collector: Box<dyn Collector>) -> &mut Self {
        self.collectors.push(collector);
        self
    }

    pub fn with_stat_client(mut self, client: Arc<dyn StatFServant>) -> Self {
        self.stat_client = Some(client);
        self
    }

    pub fn with_property_client(mut self, client: Arc<dyn PropertyFServant>) -> Self {
        self.property_client = Some(client);
        self
    }

    pub fn with_node_client(mut self, client: Arc<dyn ServerFServant>) -> Self {
        self.node_client = Some(client);
        self
    }

    /// Token that stops the server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the adapter and starts serving.
    ///
    /// Spawns the accept loop and the background task that owns every
    /// timer: stat reporting, monitor reporting and keep-alive.
    pub async fn start(mut self) -> Result<ServerHandle> {
        let server_name = self.config.server_name();
        let port = ServerPort::from(&self.endpoint);
        self.registry
            .ensure_admin_servant(&server_name, port, AdminServant::new(&server_name, self.shutdown.clone()))?;

        let listener = TcpServer::new(&self.endpoint.address()).await?;
        let local_addr = listener.local_addr()?;

        let stat = self
            .stat_client
            .take()
            .map(|client| Arc::new(Stat::new(self.config.client.stat_table.clone(), client)));

        let keep_alive_infos = self.keep_alive_infos();
        let mut dispatcher = Dispatcher::new(Arc::new(std::mem::take(&mut self.registry)))
            .with_identity(&self.config.server.app, &self.config.server.server, &self.config.server.local_ip)
            .expose_errors(self.config.server.expose_errors);
        if let Some(stat) = &stat {
            dispatcher = dispatcher.with_stat(stat.clone());
        }
        let dispatcher = Arc::new(dispatcher);

        let mut monitor = Monitor::new(&server_name, &self.config.server.node, &self.config.server.local_ip)
            .with_collectors(std::mem::take(&mut self.collectors))
            .with_sample_timeout(self.config.client.report_interval());
        if let Some(client) = self.property_client.take() {
            monitor = monitor.with_client(client);
        }

        tracing::info!(
            "Server {} listening on {} with servants [{}]",
            server_name,
            local_addr,
            dispatcher.registry().names().collect::<Vec<_>>().join(", ")
        );

        let accept_token = self.shutdown.clone();
        let accept = tokio::spawn(async move {
            let handler = move |frame: Vec<u8>, peer: SocketAddr| {
                let dispatcher = dispatcher.clone();
                async move { dispatcher.handle_frame(&frame, peer).await }
            };
            let stop = async move { accept_token.cancelled().await };
            if let Err(e) = listener.run_until(handler, stop).await {
                tracing::error!("Accept loop failed: {}", e);
            }
        });

        let keep_alive = self.node_client.take().map(|client| KeepAlive {
            client,
            infos: keep_alive_infos,
        });
        let background = BackgroundTask {
            stat: stat.clone(),
            monitor,
            keep_alive,
            report_interval: self.config.client.report_interval(),
            keep_alive_interval: self.config.client.keep_alive_interval(),
            shutdown: self.shutdown.clone(),
        };
        let background = tokio::spawn(background.run());

        Ok(ServerHandle {
            local_addr,
            shutdown: self.shutdown,
            stat,
            accept,
            background,
        })
    }

    fn keep_alive_infos(&self) -> Vec<ServerInfo> {
        let pid = i32::try_from(std::process::id()).unwrap_or(0);
        self.config
            .server
            .adapters
            .iter()
            .map(|adapter| ServerInfo {
                application: self.config.server.app.clone(),
                server_name: self.config.server.server.clone(),
                pid,
                adapter: adapter.name.clone(),
            })
            .collect()
    }
}

struct KeepAlive {
    client: Arc<dyn ServerFServant>,
    infos: Vec<ServerInfo>,
}

impl KeepAlive {
    async fn beat(&self) {
        for info in &self.infos {
            if let Err(e) = self.client.keep_alive(info).await {
                tracing::warn!("Keep-alive for {} failed: {}", info.adapter, e);
            }
        }
    }
}

/// The background role. Only this task runs periodic work, so each window
/// is reported exactly once.
struct BackgroundTask {
    stat: Option<Arc<Stat>>,
    monitor: Monitor,
    keep_alive: Option<KeepAlive>,
    report_interval: Duration,
    keep_alive_interval: Duration,
    shutdown: CancellationToken,
}

impl BackgroundTask {
    async fn run(self) {
        let mut report = interval_at(Instant::now() + self.report_interval, self.report_interval);
        report.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut keep_alive = interval_at(Instant::now(), self.keep_alive_interval);
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let keep_alive_enabled = self.keep_alive.is_some() && self.monitor.is_enabled();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = report.tick() => {
                    if let Some(stat) = &self.stat {
                        stat.report().await;
                        stat.report_samples().await;
                    }
                    self.monitor.report().await;
                }
                _ = keep_alive.tick(), if keep_alive_enabled => {
                    if let Some(keep_alive) = &self.keep_alive {
                        keep_alive.beat().await;
                    }
                }
            }
        }

        if let Some(stat) = &self.stat {
            tracing::info!("Flushing stat window before shutdown");
            stat.report().await;
            stat.report_samples().await;
        }
    }
}

/// A running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    stat: Option<Arc<Stat>>,
    accept: JoinHandle<()>,
    background: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the adapter is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn stat(&self) -> Option<&Arc<Stat>> {
        self.stat.as_ref()
    }

    /// Stops accepting, cancels timers and waits for the final stat flush.
    ///
    /// Connections already open finish their in-flight requests.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.wait().await;
    }

    /// Waits until the server is stopped by its token or the admin servant.
    pub async fn wait(self) {
        self.shutdown.cancelled().await;
        if let Err(e) = self.accept.await {
            tracing::error!("Accept task ended abnormally: {}", e);
        }
        if let Err(e) = self.background.await {
            tracing::error!("Background task ended abnormally: {}", e);
        }
        tracing::info!("Server on {} stopped", self.local_addr);
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle").field("local_addr", &self.local_addr).finish()
    }
}
