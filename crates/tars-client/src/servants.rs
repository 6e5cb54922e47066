//! Contracts of the remote services the server reports to.
//!
//! The server core only depends on these traits. [`crate::client`] has the
//! TCP implementations; tests substitute in-memory ones.

use async_trait::async_trait;
use tars_common::protocol::error::Result;

use crate::types::{PropertyRecord, SampleRecord, ServerInfo, StatKey, StatSnapshot};

/// Servant name of the stat service.
pub const STAT_SERVANT: &str = "tars.tarsstat.StatObj";
/// Servant name of the property service.
pub const PROPERTY_SERVANT: &str = "tars.tarsproperty.PropertyObj";
/// Servant name of the local node agent.
pub const NODE_SERVANT: &str = "tars.tarsnode.ServerObj";

/// Stat service (`reportMicMsg`, `reportSampleMsg`).
#[async_trait]
pub trait StatFServant: Send + Sync {
    /// Reports one window of call statistics. Returns 0 on acceptance.
    async fn report_mic_msg(&self, msg: &[(StatKey, StatSnapshot)], from_client: bool) -> Result<i32>;

    /// Reports sampled calls. Returns 0 on acceptance.
    async fn report_sample_msg(&self, msg: &[SampleRecord]) -> Result<i32>;
}

/// Property service (`reportPropMsg`).
#[async_trait]
pub trait PropertyFServant: Send + Sync {
    async fn report_prop_msg(&self, msg: &[PropertyRecord]) -> Result<i32>;
}

/// Node agent (`keepAlive`).
#[async_trait]
pub trait ServerFServant: Send + Sync {
    async fn keep_alive(&self, info: &ServerInfo) -> Result<i32>;
}
