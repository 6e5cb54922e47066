//! Tars Server
//!
//! Servant registry, request dispatch, the built-in admin servant and the
//! telemetry pipeline of a Tars server.
//!
//! # Components
//!
//! - [`ServantRegistry`]: servant name to implementation and method set
//! - [`Dispatcher`]: frame in, response frame out, with stat recording
//! - [`AdminServant`]: `{server}.AdminObj`, always present
//! - [`monitor`]: collectors sampled and pushed as properties
//! - [`TarsServer`]: binds the first TCP adapter and runs the background
//!   role that owns every timer

pub mod admin;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod monitor;
pub mod registry;
pub mod server;

pub use admin::AdminServant;
pub use config::{AdapterConfig, ClientProperties, MonitorProperties, ServerConfig, ServerProperties};
pub use dispatcher::Dispatcher;
pub use error::{Result, ServerError};
pub use monitor::{Collector, Monitor, MonitorReport};
pub use registry::{Current, Servant, ServantError, ServantRegistry, ServerPort, ServiceLocator};
pub use server::{ServerHandle, TarsServer};
