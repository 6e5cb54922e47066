//! Client side of `ping`, `notify` and `call`.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use tars_common::transport::{Endpoint, TcpTransport};
use tars_common::{RequestPacket, ResponsePacket, TarsReader, TarsStream};

/// Accepts `host:port` or a Tars endpoint string (`tcp -h host -p port`).
pub fn resolve_target(target: &str) -> Result<String> {
    let target = target.trim();
    if target.starts_with("tcp ") || target.starts_with("udp ") || target.starts_with("ssl ") {
        let endpoint: Endpoint = target.parse()?;
        if !endpoint.is_tcp() {
            return Err(anyhow!("only tcp endpoints can be called, got '{}'", target));
        }
        return Ok(endpoint.address());
    }
    if target.rsplit_once(':').is_none() {
        return Err(anyhow!("target '{}' must be host:port or a tcp endpoint", target));
    }
    Ok(target.to_string())
}

/// Encodes string arguments at tags 1, 2, ...
pub fn encode_string_args(args: &[String]) -> Result<Vec<u8>> {
    let mut out = TarsStream::new();
    for (i, arg) in args.iter().enumerate() {
        let tag = u8::try_from(i + 1).map_err(|_| anyhow!("too many arguments"))?;
        out.write_string(tag, arg);
    }
    Ok(out.into_bytes())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// JSON view of a response for scripting.
pub fn response_json(response: &ResponsePacket, elapsed: Duration) -> Value {
    let text = TarsReader::new(&response.buffer)
        .read_string(0, false)
        .ok()
        .filter(|s| !s.is_empty());
    json!({
        "request_id": response.request_id,
        "ret": response.ret,
        "status": format!("{:?}", response.status_code()),
        "result_desc": response.result_desc,
        "buffer": hex(&response.buffer),
        "text": text,
        "elapsed_ms": elapsed.as_millis() as u64,
    })
}

/// Sends one request and waits for its response.
pub async fn invoke(target: &str, request: RequestPacket) -> Result<(ResponsePacket, Duration)> {
    let addr = resolve_target(target)?;
    let started = Instant::now();
    let response = TcpTransport::new()
        .invoke(&addr, &request)
        .await?
        .ok_or_else(|| anyhow!("no response for one-way request"))?;
    Ok((response, started.elapsed()))
}

pub fn admin_servant(server_name: &str) -> String {
    format!("{}.AdminObj", server_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tars_common::Status;

    #[test]
    fn test_resolve_host_port() {
        assert_eq!(resolve_target("127.0.0.1:9000").unwrap(), "127.0.0.1:9000");
        assert!(resolve_target("localhost").is_err());
    }

    #[test]
    fn test_resolve_endpoint_string() {
        assert_eq!(resolve_target("tcp -h 10.0.0.1 -p 9000 -t 60000").unwrap(), "10.0.0.1:9000");
        assert!(resolve_target("udp -h 10.0.0.1 -p 9000").is_err());
    }

    #[test]
    fn test_string_args_tags() {
        let bytes = encode_string_args(&["a".to_string(), "b".to_string()]).unwrap();
        let mut reader = TarsReader::new(&bytes);
        assert_eq!(reader.read_string(1, true).unwrap(), "a");
        assert_eq!(reader.read_string(2, true).unwrap(), "b");

        let many: Vec<String> = (0..255).map(|i| i.to_string()).collect();
        assert!(encode_string_args(&many).is_ok());
        let too_many: Vec<String> = (0..256).map(|i| i.to_string()).collect();
        assert!(encode_string_args(&too_many).is_err());
    }

    #[test]
    fn test_response_json() {
        let request = RequestPacket::new("Demo.EchoServer.EchoObj", "echo", vec![]).with_request_id(9);
        let mut body = TarsStream::new();
        body.write_string(0, "hi");
        let response = ResponsePacket::success(&request, body.into_bytes());

        let value = response_json(&response, Duration::from_millis(3));
        assert_eq!(value["request_id"], 9);
        assert_eq!(value["ret"], 0);
        assert_eq!(value["status"], format!("{:?}", Status::Ok));
        assert_eq!(value["text"], "hi");
        assert_eq!(value["elapsed_ms"], 3);
    }
}
