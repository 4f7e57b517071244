//! lightning-client - call a Lightning daemon from the command line.
//!
//! Talks to the daemon over its RPC socket by default, or over REST when
//! `--rest-url` is given. Prints the result as pretty JSON on stdout; logs go
//! to stderr.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use lightning_client::config::RPC_PATH_ENV;
use lightning_client::discovery::default_rpc_path;
use lightning_client::methods::lookup;
use lightning_client::{ClientConfig, HttpClient, HttpConfig, LightningClient, Params};

/// Call a Lightning daemon over JSON-RPC
#[derive(Parser, Debug)]
#[command(name = "lightning-client")]
#[command(version, about = "Call a Lightning daemon over JSON-RPC")]
struct Cli {
    /// Socket path, or network directory containing lightning-rpc
    #[arg(long, env = RPC_PATH_ENV)]
    rpc_path: Option<PathBuf>,

    /// REST base URL; switches to the HTTP transport
    #[arg(long, requires = "rune")]
    rest_url: Option<Url>,

    /// Credential sent with every REST call
    #[arg(long, env = "LIGHTNING_RUNE", hide_env_values = true)]
    rune: Option<String>,

    /// Header carrying the REST credential
    #[arg(long, default_value = lightning_client::config::DEFAULT_CREDENTIAL_HEADER)]
    rune_header: String,

    /// Give up on a call after this many seconds (waits forever by default)
    #[arg(long)]
    timeout: Option<u64>,

    /// Method name (wire name or camel-case identifier)
    method: String,

    /// Arguments; each is parsed as JSON, falling back to a string
    args: Vec<String>,
}

/// Parse one CLI argument as JSON, or keep it as a plain string.
fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

async fn run(cli: Cli) -> Result<Value> {
    let method: &str = match lookup(&cli.method) {
        Some(wire) => wire,
        None => {
            tracing::debug!("{} is not in the registry, sending as-is", cli.method);
            &cli.method
        }
    };
    let params = Params::from_args(cli.args.iter().map(|a| parse_arg(a)).collect());
    let timeout = cli.timeout.map(Duration::from_secs);

    if let Some(base_url) = cli.rest_url {
        let mut config = HttpConfig::new(base_url, cli.rune.unwrap_or_default())
            .with_header(cli.rune_header);
        if let Some(limit) = timeout {
            config = config.with_request_timeout(limit);
        }
        let client = HttpClient::new(config).context("Failed to build REST client")?;
        return client
            .call(method, params)
            .await
            .with_context(|| format!("{} failed", method));
    }

    let mut config = ClientConfig::new(cli.rpc_path.unwrap_or_else(default_rpc_path));
    if let Some(limit) = timeout {
        config = config.with_request_timeout(limit);
    }
    let client = LightningClient::with_config(config).context("Invalid socket configuration")?;
    tracing::debug!("Using socket {}", client.target());

    client
        .call(method, params)
        .await
        .with_context(|| format!("{} failed", method))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "lightning_client=info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let result = run(cli).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
