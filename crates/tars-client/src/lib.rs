//! Tars Reporting Clients
//!
//! Typed callers for the services a Tars server reports to:
//!
//! - [`StatFServant`]: per-window call statistics and sampled calls
//! - [`PropertyFServant`]: monitor samples as properties
//! - [`ServerFServant`]: keep-alive heartbeat to the local node
//!
//! Each contract has a TCP implementation ([`StatFClient`],
//! [`PropertyFClient`], [`ServerFClient`]) built on [`ServantProxy`].
//! Arguments are TLV-encoded starting at tag 1 and the `int` result is read
//! from tag 0 of the response body.

pub mod client;
pub mod proxy;
pub mod servants;
pub mod types;

pub use client::{PropertyFClient, ServerFClient, StatFClient};
pub use proxy::{ServantProxy, DEFAULT_CALL_TIMEOUT};
pub use servants::{PropertyFServant, ServerFServant, StatFServant, NODE_SERVANT, PROPERTY_SERVANT, STAT_SERVANT};
pub use types::{
    PropertyBody, PropertyHead, PropertyRecord, PropertyValue, SampleRecord, ServerInfo, StatKey, StatSnapshot,
};
