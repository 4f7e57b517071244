//! Socket client for the Lightning daemon's RPC interface.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   commands    ┌──────────────────────┐  Unix socket  ┌──────────┐
//! │ LightningClient  │ ────────────► │  connection task     │ ◄───────────► │  daemon  │
//! │ (cloneable)      │ ◄──────────── │  backoff + pending   │  NDJSON lines └──────────┘
//! └──────────────────┘   oneshot     └──────────────────────┘
//! ```
//!
//! # Protocol
//!
//! Newline-delimited JSON-RPC 2.0:
//!
//! ```text
//! {"jsonrpc":"2.0","method":"getinfo","params":{},"id":"1"}
//! {"id":"1","result":{"id":"03abc..."}}
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use lightning_client::ipc::LightningClient;
//!
//! let client = LightningClient::new("/home/user/.lightning/bitcoin")?;
//! let info = client.call("getinfo", ()).await?;
//! ```

mod backoff;
mod client;
mod connection;
mod correlator;
mod framing;
mod transport;

pub use backoff::Backoff;
pub use client::LightningClient;
pub use connection::{ClientEvent, ConnectionState, DisconnectReason};
pub use correlator::{Correlator, Dispatch, PendingCall, Reply};
pub use framing::{encode_request, parse_line, write_line, FramingError};
pub use transport::{Connector, UnixConnector};
