use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tars_client::{SampleRecord, StatKey};
use tars_common::transport::TarsCodec;
use tars_common::{MessageType, RequestPacket, ResponsePacket, Status};
use tars_stat::{Outcome, Stat};

use crate::registry::{Current, ServantError, ServantRegistry, ServiceRegistration};

/// Method answered by every servant without reaching the implementation.
pub const PING_METHOD: &str = "tars_ping";

/// Caller name used for server-side call statistics.
pub const SERVER_MASTER_NAME: &str = "stat_from_server";

/// Request status key carrying `unid|depth|width|parentWidth` of a sampled call.
pub const SAMPLE_STATUS_KEY: &str = "STATUS_SAMPLE_KEY";

const HIDDEN_ERROR: &str = "application error";

/// Resolves requests to servants and turns every outcome into a response.
///
/// Nothing on the request path escapes as an error: decode failures,
/// unknown servants or methods, servant failures, panics and timeouts all
/// become a response carrying the request id and a status code.
pub struct Dispatcher {
    registry: Arc<ServantRegistry>,
    stat: Option<Arc<Stat>>,
    app: String,
    server: String,
    local_ip: String,
    expose_errors: bool,
}

impl Dispatcher {
    pub fn new(registry: Arc<ServantRegistry>) -> Self {
        Self {
            registry,
            stat: None,
            app: String::new(),
            server: String::new(),
            local_ip: String::new(),
            expose_errors: false,
        }
    }

    /// Records every dispatched call into `stat`.
    pub fn with_stat(mut self, stat: Arc<Stat>) -> Self {
        self.stat = Some(stat);
        self
    }

    /// Identity used as the callee side of recorded stat keys.
    pub fn with_identity(mut self, app: impl Into<String>, server: impl Into<String>, local_ip: impl Into<String>) -> Self {
        self.app = app.into();
        self.server = server.into();
        self.local_ip = local_ip.into();
        self
    }

    /// Sends servant error details back to callers instead of a generic text.
    pub fn expose_errors(mut self, expose: bool) -> Self {
        self.expose_errors = expose;
        self
    }

    pub fn registry(&self) -> &ServantRegistry {
        &self.registry
    }

    /// Handles one complete request frame.
    ///
    /// Returns the response frame to write, or `None` for one-way requests,
    /// which are still executed but never answered.
    pub async fn handle_frame(&self, frame: &[u8], peer: SocketAddr) -> Option<Vec<u8>> {
        let response = match TarsCodec::decode_request(frame) {
            Ok(request) => {
                let response = self.dispatch(&request, Some(peer)).await;
                tracing::info!(
                    target: "tars_server::access",
                    "{} {}::{} id={} ret={} in={} out={}",
                    peer,
                    request.servant_name,
                    request.func_name,
                    request.request_id,
                    response.ret,
                    request.buffer.len(),
                    response.buffer.len()
                );
                if request.is_one_way() {
                    return None;
                }
                response
            }
            Err(failure) => {
                tracing::warn!(
                    "Failed to decode request {} from {}: {}",
                    failure.packet().request_id,
                    peer,
                    failure.message()
                );
                if failure.packet().is_one_way() {
                    return None;
                }
                failure.to_response()
            }
        };

        match TarsCodec::encode_response(&response) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::error!("Failed to encode response {}: {}", response.request_id, e);
                let fallback = ResponsePacket {
                    ret: Status::EncodeError.code(),
                    buffer: Vec::new(),
                    result_desc: e.to_string(),
                    ..response
                };
                TarsCodec::encode_response(&fallback).ok()
            }
        }
    }

    /// Routes a decoded request and returns its response.
    ///
    /// Calls that reach a servant method are recorded into the stat table;
    /// routing failures are not.
    pub async fn dispatch(&self, request: &RequestPacket, peer: Option<SocketAddr>) -> ResponsePacket {
        let Some(service) = self.registry.get(&request.servant_name) else {
            tracing::debug!("Servant not found: {}", request.servant_name);
            return ResponsePacket::error(
                request,
                Status::ServantNotFound.code(),
                format!("servant {} not found", request.servant_name),
            );
        };

        if request.func_name == PING_METHOD {
            return ResponsePacket::success(request, Vec::new());
        }

        if !service.has_method(&request.func_name) {
            tracing::debug!("Method not found: {}::{}", request.servant_name, request.func_name);
            return ResponsePacket::error(
                request,
                Status::MethodNotFound.code(),
                format!("method {}::{} not found", request.servant_name, request.func_name),
            );
        }

        tracing::debug!(
            "Dispatching {}::{} (request {})",
            request.servant_name,
            request.func_name,
            request.request_id
        );

        let started = Instant::now();
        let (response, outcome) = self.invoke(service, request, peer).await;
        self.record(service, request, peer, outcome, started.elapsed());
        response
    }

    async fn invoke(
        &self,
        service: &Arc<ServiceRegistration>,
        request: &RequestPacket,
        peer: Option<SocketAddr>,
    ) -> (ResponsePacket, Outcome) {
        let current = Current {
            request_id: request.request_id,
            servant_name: request.servant_name.clone(),
            func_name: request.func_name.clone(),
            message_type: request.message_type,
            context: request.context.clone(),
            timeout: request.timeout,
            peer,
        };
        let servant = service.servant.clone();
        let method = request.func_name.clone();
        let payload = request.buffer.clone();

        // Own task so a panicking servant fails only its own request.
        let mut task = tokio::spawn(async move { servant.invoke(&method, &current, &payload).await });

        let joined = if request.timeout.is_zero() {
            (&mut task).await
        } else {
            match tokio::time::timeout(request.timeout, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    task.abort();
                    tracing::warn!(
                        "{}::{} timed out after {}ms (request {})",
                        request.servant_name,
                        request.func_name,
                        request.timeout.as_millis(),
                        request.request_id
                    );
                    let response = ResponsePacket::error(
                        request,
                        Status::InvokeTimeout.code(),
                        format!("invoke timeout after {}ms", request.timeout.as_millis()),
                    );
                    return (response, Outcome::Timeout);
                }
            }
        };

        match joined {
            Ok(Ok(buffer)) => (ResponsePacket::success(request, buffer), Outcome::Success),
            Ok(Err(ServantError::Application(detail))) => {
                tracing::warn!(
                    "{}::{} failed (request {}): {}",
                    request.servant_name,
                    request.func_name,
                    request.request_id,
                    detail
                );
                let desc = if self.expose_errors { detail } else { HIDDEN_ERROR.to_string() };
                (
                    ResponsePacket::error(request, Status::ApplicationError.code(), desc),
                    Outcome::Exception,
                )
            }
            Ok(Err(ServantError::Status { code, .. })) if code == Status::Ok.code() => {
                (ResponsePacket::success(request, Vec::new()), Outcome::Success)
            }
            Ok(Err(ServantError::Status { code, message })) => {
                (ResponsePacket::error(request, code, message), Outcome::Exception)
            }
            Err(e) => {
                tracing::error!(
                    "{}::{} aborted (request {}): {}",
                    request.servant_name,
                    request.func_name,
                    request.request_id,
                    e
                );
                (
                    ResponsePacket::error(request, Status::ApplicationError.code(), HIDDEN_ERROR),
                    Outcome::Exception,
                )
            }
        }
    }

    fn record(
        &self,
        service: &ServiceRegistration,
        request: &RequestPacket,
        peer: Option<SocketAddr>,
        outcome: Outcome,
        elapsed: Duration,
    ) {
        let Some(stat) = &self.stat else {
            return;
        };

        let master_ip = peer.map(|p| p.ip().to_string()).unwrap_or_default();
        let key = StatKey {
            master_name: SERVER_MASTER_NAME.to_string(),
            slave_app: self.app.clone(),
            slave_server: format!("{}.{}", self.server, service.locator.service()),
            interface_name: request.func_name.clone(),
            master_ip: master_ip.clone(),
            slave_ip: self.local_ip.clone(),
        };
        stat.record(&key, outcome, elapsed);

        if request.message_type.contains(MessageType::SAMPLE) {
            if let Some(sample) = sample_record(request, &key, master_ip) {
                if !stat.push_sample(sample) {
                    tracing::debug!("Sample queue full, dropped sample of request {}", request.request_id);
                }
            }
        }
    }
}

/// Builds the sample record of a sampled call from its status map.
fn sample_record(request: &RequestPacket, key: &StatKey, master_ip: String) -> Option<SampleRecord> {
    let raw = request.status.get(SAMPLE_STATUS_KEY)?;
    let mut parts = raw.split('|');
    let unid = parts.next().filter(|u| !u.is_empty())?.to_string();
    let mut next_int = || parts.next().and_then(|v| v.parse::<i32>().ok()).unwrap_or(0);
    let depth = next_int();
    let width = next_int();
    let parent_width = next_int();

    Some(SampleRecord {
        unid,
        master_name: key.master_name.clone(),
        slave_name: key.slave_name(),
        interface_name: key.interface_name.clone(),
        master_ip,
        slave_ip: key.slave_ip.clone(),
        depth,
        width,
        parent_width,
    })
}
