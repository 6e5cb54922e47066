//! # Tars CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Run the echo server described by a config file
//! tars serve --config config/echo-server.toml
//!
//! # Liveness check through the admin servant
//! tars ping 127.0.0.1:9000 --server Demo.EchoServer
//!
//! # Admin command
//! tars notify 127.0.0.1:9000 tars.viewversion --server Demo.EchoServer
//!
//! # Raw call, string arguments at tags 1, 2, ...
//! tars call "tcp -h 127.0.0.1 -p 9000" Demo.EchoServer.EchoObj echo -s hello
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use tars_cli::demo::{EchoServant, ECHO_SERVICE};
use tars_cli::probe;
use tars_common::{RequestPacket, TarsStream};
use tars_server::{ServerConfig, TarsServer};

#[derive(FromArgs)]
/// Tars RPC server and probe
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Ping(PingArgs),
    Notify(NotifyArgs),
    Call(CallArgs),
}

/// Arguments for running a server.
///
/// The config names the adapters, the reporting service locators and the
/// node. The demo echo servant is registered as `{app}.{server}.EchoObj`.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// run a Tars server
struct ServeArgs {
    /// path to the TOML server config
    #[argh(option, short = 'c', default = "\"config/echo-server.toml\".into()")]
    config: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "ping")]
/// ping a server's admin servant
struct PingArgs {
    /// host:port or tcp endpoint of the server
    #[argh(positional)]
    target: String,

    /// server name, `app.server`
    #[argh(option, default = "\"Demo.EchoServer\".into()")]
    server: String,

    /// call timeout in milliseconds
    #[argh(option, short = 't', default = "3000")]
    timeout_ms: u64,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "notify")]
/// send an admin command such as tars.viewversion
struct NotifyArgs {
    /// host:port or tcp endpoint of the server
    #[argh(positional)]
    target: String,

    /// command text
    #[argh(positional)]
    command: String,

    /// server name, `app.server`
    #[argh(option, default = "\"Demo.EchoServer\".into()")]
    server: String,
}

/// Arguments for a raw call.
///
/// Output is one JSON object on stdout so it can be piped to `jq`.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call a servant method
struct CallArgs {
    /// host:port or tcp endpoint of the server
    #[argh(positional)]
    target: String,

    /// full servant name
    #[argh(positional)]
    servant: String,

    /// method name
    #[argh(positional)]
    method: String,

    /// string argument, may be repeated
    #[argh(option, short = 's', long = "string")]
    strings: Vec<String>,

    /// call timeout in milliseconds
    #[argh(option, short = 't', default = "3000")]
    timeout_ms: u64,

    /// send without waiting for a response
    #[argh(switch)]
    one_way: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Probe commands print JSON on stdout; keep it clean.
    if matches!(cli.command, Commands::Serve(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Ping(args) => {
            let request = RequestPacket::new(probe::admin_servant(&args.server), "ping", Vec::new())
                .with_timeout(Duration::from_millis(args.timeout_ms));
            print_call(&args.target, request).await
        }
        Commands::Notify(args) => {
            let mut body = TarsStream::new();
            body.write_string(1, &args.command);
            let request = RequestPacket::new(probe::admin_servant(&args.server), "notify", body.into_bytes());
            print_call(&args.target, request).await
        }
        Commands::Call(args) => run_call(args).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = ServerConfig::from_file(&args.config)
        .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", args.config, e))?;
    tracing::info!("Starting {} from {}", config.server_name(), args.config);

    let mut server = TarsServer::new(config)?;
    server.add_servant(ECHO_SERVICE, Arc::new(EchoServant), EchoServant::METHODS)?;

    let handle = server.start().await?;
    let token = handle.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            token.cancel();
        }
    });

    handle.wait().await;
    Ok(())
}

async fn run_call(args: CallArgs) -> Result<()> {
    let body = probe::encode_string_args(&args.strings)?;
    let mut request =
        RequestPacket::new(&args.servant, &args.method, body).with_timeout(Duration::from_millis(args.timeout_ms));

    if args.one_way {
        request = request.one_way();
        let addr = probe::resolve_target(&args.target)?;
        tars_common::transport::TcpTransport::new().invoke(&addr, &request).await?;
        println!("{}", serde_json::json!({ "request_id": request.request_id, "one_way": true }));
        return Ok(());
    }

    print_call(&args.target, request).await
}

async fn print_call(target: &str, request: RequestPacket) -> Result<()> {
    let (response, elapsed) = probe::invoke(target, request).await?;
    println!("{}", serde_json::to_string(&probe::response_json(&response, elapsed))?);
    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_serve_default() {
        let args: Cli = Cli::from_args(&["tars"], &["serve"]).unwrap();
        match args.command {
            Commands::Serve(ServeArgs { config }) => assert_eq!(config, "config/echo-server.toml"),
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_parse_serve_config() {
        let args: Cli = Cli::from_args(&["tars"], &["serve", "-c", "/etc/tars/echo.toml"]).unwrap();
        match args.command {
            Commands::Serve(ServeArgs { config }) => assert_eq!(config, "/etc/tars/echo.toml"),
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_parse_ping() {
        let args: Cli = Cli::from_args(&["tars"], &["ping", "127.0.0.1:9000", "--server", "App.Srv"]).unwrap();
        match args.command {
            Commands::Ping(PingArgs { target, server, timeout_ms }) => {
                assert_eq!(target, "127.0.0.1:9000");
                assert_eq!(server, "App.Srv");
                assert_eq!(timeout_ms, 3000); // default
            }
            _ => panic!("Expected Ping command"),
        }
    }

    #[test]
    fn test_cli_parse_notify() {
        let args: Cli = Cli::from_args(&["tars"], &["notify", "127.0.0.1:9000", "tars.viewversion"]).unwrap();
        match args.command {
            Commands::Notify(NotifyArgs { target, command, server }) => {
                assert_eq!(target, "127.0.0.1:9000");
                assert_eq!(command, "tars.viewversion");
                assert_eq!(server, "Demo.EchoServer");
            }
            _ => panic!("Expected Notify command"),
        }
    }

    #[test]
    fn test_cli_parse_call_with_strings() {
        let args: Cli = Cli::from_args(
            &["tars"],
            &[
                "call",
                "tcp -h 127.0.0.1 -p 9000",
                "Demo.EchoServer.EchoObj",
                "echo",
                "-s",
                "a",
                "--string",
                "b",
                "--one-way",
            ],
        )
        .unwrap();
        match args.command {
            Commands::Call(CallArgs { target, servant, method, strings, timeout_ms, one_way }) => {
                assert_eq!(target, "tcp -h 127.0.0.1 -p 9000");
                assert_eq!(servant, "Demo.EchoServer.EchoObj");
                assert_eq!(method, "echo");
                assert_eq!(strings, vec!["a".to_string(), "b".to_string()]);
                assert_eq!(timeout_ms, 3000);
                assert!(one_way);
            }
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_cli_parse_call_requires_method() {
        assert!(Cli::from_args(&["tars"], &["call", "127.0.0.1:9000", "Demo.EchoServer.EchoObj"]).is_err());
    }
}
