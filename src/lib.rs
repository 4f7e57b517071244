//! Lightning daemon RPC client.
//!
//! This library provides two ways to call the daemon:
//!
//! - `ipc` - persistent Unix socket client with automatic reconnect and
//!   out-of-order response correlation
//! - `http` - one-shot REST calls authenticated with a static credential
//!
//! plus the shared JSON-RPC types (`protocol`), the method registry
//! (`methods`) and socket path discovery (`discovery`).
//!
//! # Socket client
//!
//! ```ignore
//! use lightning_client::LightningClient;
//! use serde_json::json;
//!
//! let client = LightningClient::new("/home/user/.lightning/bitcoin")?;
//! let info = client.getinfo(()).await?;
//! let channels = client.listchannels(vec![json!(null), info["id"].clone()]).await?;
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod http;
pub mod ipc;
pub mod methods;
pub mod protocol;

pub use config::{BackoffConfig, ClientConfig, HttpConfig};
pub use error::{ClientError, ErrorCategory};
pub use http::HttpClient;
pub use ipc::{ClientEvent, ConnectionState, LightningClient};
pub use protocol::{Params, RpcError};
