//! Structs exchanged with the stat, property and node services.
//!
//! Field tags follow the published Tars definitions (`StatMicMsgHead`,
//! `StatMicMsgBody`, `StatSampleMsg`, `StatPropMsgHead`, `StatPropMsgBody`,
//! `ServerInfo`), so the services can decode them with their own stubs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tars_common::protocol::error::Result;
use tars_common::{TarsReader, TarsStream, TarsStruct};

/// Identity of one aggregated call stream.
///
/// The master is the caller, the slave is this server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatKey {
    pub master_name: String,
    pub slave_app: String,
    pub slave_server: String,
    pub interface_name: String,
    pub master_ip: String,
    pub slave_ip: String,
}

impl StatKey {
    /// `app.server` as the stat service expects it.
    pub fn slave_name(&self) -> String {
        format!("{}.{}", self.slave_app, self.slave_server)
    }
}

impl TarsStruct for StatKey {
    fn write_to(&self, out: &mut TarsStream) {
        out.write_string(0, &self.master_name);
        out.write_string(1, &self.slave_name());
        out.write_string(2, &self.interface_name);
        out.write_string(3, &self.master_ip);
        out.write_string(4, &self.slave_ip);
        out.write_i32(5, 0);
        out.write_i32(6, 0);
    }

    fn read_from(reader: &mut TarsReader<'_>) -> Result<Self> {
        let master_name = reader.read_string(0, true)?;
        let slave_name = reader.read_string(1, true)?;
        let interface_name = reader.read_string(2, true)?;
        let master_ip = reader.read_string(3, true)?;
        let slave_ip = reader.read_string(4, true)?;

        let (slave_app, slave_server) = match slave_name.split_once('.') {
            Some((app, server)) => (app.to_string(), server.to_string()),
            None => (String::new(), slave_name),
        };

        Ok(StatKey {
            master_name,
            slave_app,
            slave_server,
            interface_name,
            master_ip,
            slave_ip,
        })
    }
}

/// Counters of one stat window for one key. Times are in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub count: u64,
    pub timeout_count: u64,
    pub exec_count: u64,
    pub total_count: u64,
    pub total_rsp_time: u64,
    pub max_rsp_time: u64,
    pub min_rsp_time: u64,
}

fn to_i32(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

impl TarsStruct for StatSnapshot {
    fn write_to(&self, out: &mut TarsStream) {
        out.write_i32(0, to_i32(self.count));
        out.write_i32(1, to_i32(self.timeout_count));
        out.write_i32(2, to_i32(self.exec_count));
        // intervalCount histogram is not collected
        out.write_string_map(3, &BTreeMap::new());
        out.write_i64(4, i64::try_from(self.total_rsp_time).unwrap_or(i64::MAX));
        out.write_i32(5, to_i32(self.max_rsp_time));
        out.write_i32(6, to_i32(self.min_rsp_time));
    }

    fn read_from(reader: &mut TarsReader<'_>) -> Result<Self> {
        let count = reader.read_i32(0, true)?.max(0) as u64;
        let timeout_count = reader.read_i32(1, true)?.max(0) as u64;
        let exec_count = reader.read_i32(2, true)?.max(0) as u64;
        let total_rsp_time = reader.read_i64(4, true)?.max(0) as u64;
        let max_rsp_time = reader.read_i32(5, true)?.max(0) as u64;
        let min_rsp_time = reader.read_i32(6, true)?.max(0) as u64;

        Ok(StatSnapshot {
            count,
            timeout_count,
            exec_count,
            total_count: count + timeout_count + exec_count,
            total_rsp_time,
            max_rsp_time,
            min_rsp_time,
        })
    }
}

/// A sampled call, used for call-chain tracing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub unid: String,
    pub master_name: String,
    pub slave_name: String,
    pub interface_name: String,
    pub master_ip: String,
    pub slave_ip: String,
    pub depth: i32,
    pub width: i32,
    pub parent_width: i32,
}

impl TarsStruct for SampleRecord {
    fn write_to(&self, out: &mut TarsStream) {
        out.write_string(0, &self.unid);
        out.write_string(1, &self.master_name);
        out.write_string(2, &self.slave_name);
        out.write_string(3, &self.interface_name);
        out.write_string(4, &self.master_ip);
        out.write_string(5, &self.slave_ip);
        out.write_i32(6, self.depth);
        out.write_i32(7, self.width);
        out.write_i32(8, self.parent_width);
    }

    fn read_from(reader: &mut TarsReader<'_>) -> Result<Self> {
        Ok(SampleRecord {
            unid: reader.read_string(0, true)?,
            master_name: reader.read_string(1, true)?,
            slave_name: reader.read_string(2, true)?,
            interface_name: reader.read_string(3, true)?,
            master_ip: reader.read_string(4, true)?,
            slave_ip: reader.read_string(5, true)?,
            depth: reader.read_i32(6, true)?,
            width: reader.read_i32(7, true)?,
            parent_width: reader.read_i32(8, true)?,
        })
    }
}

/// Identity of a reported property (`StatPropMsgHead`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyHead {
    pub module_name: String,
    pub ip: String,
    pub property_name: String,
}

impl TarsStruct for PropertyHead {
    fn write_to(&self, out: &mut TarsStream) {
        out.write_string(0, &self.module_name);
        out.write_string(1, &self.ip);
        out.write_string(2, &self.property_name);
    }

    fn read_from(reader: &mut TarsReader<'_>) -> Result<Self> {
        Ok(PropertyHead {
            module_name: reader.read_string(0, true)?,
            ip: reader.read_string(1, true)?,
            property_name: reader.read_string(2, true)?,
        })
    }
}

/// One aggregation policy and its value (`StatPropInfo`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValue {
    pub policy: String,
    pub value: String,
}

impl TarsStruct for PropertyValue {
    fn write_to(&self, out: &mut TarsStream) {
        out.write_string(0, &self.policy);
        out.write_string(1, &self.value);
    }

    fn read_from(reader: &mut TarsReader<'_>) -> Result<Self> {
        Ok(PropertyValue {
            policy: reader.read_string(0, true)?,
            value: reader.read_string(1, true)?,
        })
    }
}

/// Values reported for one property (`StatPropMsgBody`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyBody {
    pub values: Vec<PropertyValue>,
}

impl TarsStruct for PropertyBody {
    fn write_to(&self, out: &mut TarsStream) {
        out.write_list(0, &self.values);
    }

    fn read_from(reader: &mut TarsReader<'_>) -> Result<Self> {
        Ok(PropertyBody {
            values: reader.read_list(0, true)?,
        })
    }
}

/// A property sample ready to be sent to the property service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub head: PropertyHead,
    pub body: PropertyBody,
}

impl PropertyRecord {
    /// Builds a record holding a single value under `policy`.
    pub fn single(head: PropertyHead, policy: impl Into<String>, value: impl Into<String>) -> Self {
        PropertyRecord {
            head,
            body: PropertyBody {
                values: vec![PropertyValue {
                    policy: policy.into(),
                    value: value.into(),
                }],
            },
        }
    }
}

/// Heartbeat payload sent to the node (`ServerInfo`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub application: String,
    pub server_name: String,
    pub pid: i32,
    pub adapter: String,
}

impl TarsStruct for ServerInfo {
    fn write_to(&self, out: &mut TarsStream) {
        out.write_string(0, &self.application);
        out.write_string(1, &self.server_name);
        out.write_i32(2, self.pid);
        out.write_string(3, &self.adapter);
    }

    fn read_from(reader: &mut TarsReader<'_>) -> Result<Self> {
        Ok(ServerInfo {
            application: reader.read_string(0, true)?,
            server_name: reader.read_string(1, true)?,
            pid: reader.read_i32(2, true)?,
            adapter: reader.read_string(3, false)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode<T: TarsStruct>(value: &T) -> T {
        let mut out = TarsStream::new();
        out.write_struct(1, value);
        let bytes = out.into_bytes();
        let mut reader = TarsReader::new(&bytes);
        reader.read_struct::<T>(1, true).unwrap().unwrap()
    }

    #[test]
    fn test_stat_key_splits_slave_name() {
        let key = StatKey {
            master_name: "client".into(),
            slave_app: "Demo".into(),
            slave_server: "Server.EchoObj".into(),
            interface_name: "echo".into(),
            master_ip: "10.0.0.1".into(),
            slave_ip: "10.0.0.2".into(),
        };
        assert_eq!(key.slave_name(), "Demo.Server.EchoObj");
        assert_eq!(decode(&key), key);
    }

    #[test]
    fn test_snapshot_recomputes_total() {
        let snapshot = StatSnapshot {
            count: 5,
            timeout_count: 1,
            exec_count: 2,
            total_count: 8,
            total_rsp_time: 120,
            max_rsp_time: 40,
            min_rsp_time: 3,
        };
        assert_eq!(decode(&snapshot), snapshot);
    }

    #[test]
    fn test_snapshot_saturates_large_counters() {
        let snapshot = StatSnapshot {
            count: u64::MAX,
            ..Default::default()
        };
        let decoded = decode(&snapshot);
        assert_eq!(decoded.count, i32::MAX as u64);
    }

    #[test]
    fn test_server_info_without_adapter() {
        let mut out = TarsStream::new();
        out.write_string(0, "Demo");
        out.write_string(1, "Server");
        out.write_i32(2, 42);
        let bytes = out.into_bytes();
        let info = ServerInfo::read_from(&mut TarsReader::new(&bytes)).unwrap();
        assert_eq!(info.pid, 42);
        assert!(info.adapter.is_empty());
    }
}
