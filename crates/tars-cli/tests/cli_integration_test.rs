//! CLI integration tests.
//!
//! The probe commands run as a child process against a server started in
//! this test process on a loopback port.

use std::io::Write;
use std::process::{Command, Output};
use std::sync::Arc;

use tars_cli::demo::{EchoServant, ECHO_SERVICE};
use tars_server::{ServerConfig, ServerHandle, TarsServer};

fn tars_bin() -> &'static str {
    env!("CARGO_BIN_EXE_tars")
}

const CONFIG: &str = r#"
[server]
app = "Demo"
server = "EchoServer"

[[server.adapters]]
name = "Demo.EchoServer.EchoObjAdapter"
endpoint = "tcp -h 127.0.0.1 -p 0"
servant = "Demo.EchoServer.EchoObj"
"#;

async fn start_server() -> ServerHandle {
    let mut server = TarsServer::new(ServerConfig::from_toml(CONFIG).unwrap()).unwrap();
    server.add_servant(ECHO_SERVICE, Arc::new(EchoServant), EchoServant::METHODS).unwrap();
    server.start().await.unwrap()
}

async fn run(args: Vec<String>) -> Output {
    tokio::task::spawn_blocking(move || Command::new(tars_bin()).args(&args).output().unwrap())
        .await
        .unwrap()
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be one JSON object")
}

#[tokio::test]
async fn test_ping_admin_servant() {
    let handle = start_server().await;
    let target = handle.local_addr().to_string();

    let output = run(vec!["ping".into(), target]).await;
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let value = stdout_json(&output);
    assert_eq!(value["ret"], 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_call_echo_with_endpoint_string() {
    let handle = start_server().await;
    let target = format!("tcp -h 127.0.0.1 -p {}", handle.local_addr().port());

    let output = run(vec![
        "call".into(),
        target,
        "Demo.EchoServer.EchoObj".into(),
        "echo".into(),
        "-s".into(),
        "hello".into(),
    ])
    .await;
    assert!(output.status.success());
    let value = stdout_json(&output);
    assert_eq!(value["text"], "hello");
    assert_eq!(value["status"], "Ok");

    handle.shutdown().await;
}

#[tokio::test]
async fn test_call_unknown_servant_exits_nonzero() {
    let handle = start_server().await;

    let output = run(vec![
        "call".into(),
        handle.local_addr().to_string(),
        "Ghost".into(),
        "x".into(),
    ])
    .await;
    assert!(!output.status.success());
    let value = stdout_json(&output);
    assert_eq!(value["status"], "ServantNotFound");

    handle.shutdown().await;
}

#[tokio::test]
async fn test_notify_servername() {
    let handle = start_server().await;

    let output = run(vec![
        "notify".into(),
        handle.local_addr().to_string(),
        "tars.servername".into(),
    ])
    .await;
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["text"], "Demo.EchoServer");

    handle.shutdown().await;
}

#[test]
fn test_ping_unreachable_server_fails() {
    let output = Command::new(tars_bin())
        .args(["ping", "127.0.0.1:1", "-t", "500"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_serve_missing_config_fails() {
    let output = Command::new(tars_bin())
        .args(["serve", "-c", "/nonexistent/tars.toml"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to load config"));
}

#[test]
fn test_serve_rejects_config_without_tcp_adapter() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[server]
app = "Demo"
server = "EchoServer"

[[server.adapters]]
name = "Demo.EchoServer.UdpAdapter"
endpoint = "udp -h 127.0.0.1 -p 9000"
"#
    )
    .unwrap();

    let output = Command::new(tars_bin())
        .args(["serve", "-c", file.path().to_str().unwrap()])
        .output()
        .unwrap();
    assert!(!output.status.success());
}
