use async_trait::async_trait;
use tars_common::protocol::error::Result;
use tars_common::transport::Endpoint;
use tars_common::TarsStream;

use crate::proxy::ServantProxy;
use crate::servants::{PropertyFServant, ServerFServant, StatFServant, NODE_SERVANT, PROPERTY_SERVANT, STAT_SERVANT};
use crate::types::{PropertyBody, PropertyHead, PropertyRecord, SampleRecord, ServerInfo, StatKey, StatSnapshot};

/// TCP client for `tars.tarsstat.StatObj`.
#[derive(Debug, Clone)]
pub struct StatFClient {
    proxy: ServantProxy,
}

impl StatFClient {
    pub fn new(endpoint: &Endpoint) -> Result<Self> {
        Ok(Self::with_proxy(ServantProxy::new(STAT_SERVANT, endpoint)?))
    }

    pub fn with_proxy(proxy: ServantProxy) -> Self {
        Self { proxy }
    }
}

#[async_trait]
impl StatFServant for StatFClient {
    async fn report_mic_msg(&self, msg: &[(StatKey, StatSnapshot)], from_client: bool) -> Result<i32> {
        let mut args = TarsStream::new();
        args.write_struct_map(1, msg);
        args.write_bool(2, from_client);
        self.proxy.invoke_int("reportMicMsg", args).await
    }

    async fn report_sample_msg(&self, msg: &[SampleRecord]) -> Result<i32> {
        let mut args = TarsStream::new();
        args.write_list(1, msg);
        self.proxy.invoke_int("reportSampleMsg", args).await
    }
}

/// TCP client for `tars.tarsproperty.PropertyObj`.
#[derive(Debug, Clone)]
pub struct PropertyFClient {
    proxy: ServantProxy,
}

impl PropertyFClient {
    pub fn new(endpoint: &Endpoint) -> Result<Self> {
        Ok(Self::with_proxy(ServantProxy::new(PROPERTY_SERVANT, endpoint)?))
    }

    pub fn with_proxy(proxy: ServantProxy) -> Self {
        Self { proxy }
    }
}

#[async_trait]
impl PropertyFServant for PropertyFClient {
    async fn report_prop_msg(&self, msg: &[PropertyRecord]) -> Result<i32> {
        let entries: Vec<(PropertyHead, PropertyBody)> =
            msg.iter().map(|r| (r.head.clone(), r.body.clone())).collect();
        let mut args = TarsStream::new();
        args.write_struct_map(1, &entries);
        self.proxy.invoke_int("reportPropMsg", args).await
    }
}

/// TCP client for `tars.tarsnode.ServerObj`.
#[derive(Debug, Clone)]
pub struct ServerFClient {
    proxy: ServantProxy,
}

impl ServerFClient {
    pub fn new(endpoint: &Endpoint) -> Result<Self> {
        Ok(Self::with_proxy(ServantProxy::new(NODE_SERVANT, endpoint)?))
    }

    pub fn with_proxy(proxy: ServantProxy) -> Self {
        Self { proxy }
    }
}

#[async_trait]
impl ServerFServant for ServerFClient {
    async fn keep_alive(&self, info: &ServerInfo) -> Result<i32> {
        let mut args = TarsStream::new();
        args.write_struct(1, info);
        self.proxy.invoke_int("keepAlive", args).await
    }
}
