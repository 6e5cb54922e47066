//! Tars Call Statistics
//!
//! This crate aggregates per-call statistics on a Tars server and pushes
//! them to the stat service once per report window.
//!
//! # Architecture
//!
//! - [`StatStore`]: sharded table of per-key atomic counters
//! - [`Stat`]: records calls, buffers sampled calls, reports each window
//!   through a [`tars_client::StatFServant`]
//!
//! # Usage Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tars_client::{StatFClient, StatKey};
//! use tars_common::transport::Endpoint;
//! use tars_stat::{Outcome, Stat, StatConfig};
//!
//! let client = StatFClient::new(&Endpoint::tcp("127.0.0.1", 18888)).unwrap();
//! let stat = Stat::new(StatConfig::default(), Arc::new(client));
//!
//! let key = StatKey { interface_name: "echo".into(), ..Default::default() };
//! stat.record(&key, Outcome::Success, Duration::from_millis(4));
//! assert_eq!(stat.store().len(), 1);
//! ```
//!
//! # Thread Safety
//!
//! Recording is lock-free once a key exists: it takes a shard read lock and
//! bumps atomics. Flushing resets counters with `swap`, so calls that race a
//! flush are counted in this window or the next, never lost.

mod reporter;
mod store;

pub use reporter::Stat;
pub use store::{Outcome, StatConfig, StatStore};
