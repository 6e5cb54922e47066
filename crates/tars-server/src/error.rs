use tars_common::TarsError;
use thiserror::Error;

/// Errors that stop a server from starting.
///
/// Request-path failures never surface here; they are answered with an
/// error response instead.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Servant already registered: {0}")]
    DuplicateServant(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("No TCP adapter configured")]
    NoTcpAdapter,

    #[error("Unknown collector: {0}")]
    UnknownCollector(String),

    #[error("Failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TarsError),
}

pub type Result<T> = std::result::Result<T, ServerError>;
