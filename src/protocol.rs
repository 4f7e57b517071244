//! JSON-RPC 2.0 wire types shared by both transports.
//!
//! Requests carry a string id built from a per-client counter. Responses are
//! matched back to their request by that id only, never by arrival order.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::ClientError;

/// Protocol version tag written into every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Correlation id linking a request to its response.
///
/// Always serialized as a string. Numeric ids from the daemon are accepted
/// and stringified so they compare equal to what was sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(from = "RawId")]
pub struct RequestId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Unsigned(u64),
    Signed(i64),
}

impl From<RawId> for RequestId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => RequestId(s),
            RawId::Unsigned(n) => RequestId(n.to_string()),
            RawId::Signed(n) => RequestId(n.to_string()),
        }
    }
}

impl From<u64> for RequestId {
    fn from(n: u64) -> Self {
        RequestId(n.to_string())
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId(s.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Request parameters: either named (a JSON object) or positional (an array).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    Named(Map<String, Value>),
    Positional(Vec<Value>),
}

impl Params {
    /// Empty named parameters, serialized as `{}`.
    pub fn none() -> Self {
        Params::Named(Map::new())
    }

    /// Shape a positional argument list the way the method wrappers do.
    ///
    /// A single object argument becomes the named parameters. No arguments
    /// become `{}`. Anything else is sent as an array, in order.
    pub fn from_args(mut args: Vec<Value>) -> Self {
        match args.len() {
            0 => Params::none(),
            1 if args[0].is_object() => match args.pop() {
                Some(Value::Object(map)) => Params::Named(map),
                _ => Params::none(),
            },
            _ => Params::Positional(args),
        }
    }

    /// The parameters as a plain JSON value (the HTTP body).
    pub fn into_value(self) -> Value {
        match self {
            Params::Named(map) => Value::Object(map),
            Params::Positional(args) => Value::Array(args),
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Params::none()
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::none()
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Params::Named(map)
    }
}

impl From<Vec<Value>> for Params {
    fn from(args: Vec<Value>) -> Self {
        Params::from_args(args)
    }
}

/// A single argument, shaped like a one-element argument list: an object
/// becomes the named parameters and anything else (arrays and `null`
/// included) is wrapped as the only positional argument.
impl From<Value> for Params {
    fn from(value: Value) -> Self {
        Params::from_args(vec![value])
    }
}

/// An outbound JSON-RPC request. Field order matches the wire layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Params,
    pub id: RequestId,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Params, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// Structured error object returned by the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// The `error` member of a response.
///
/// Anything that is not a well-formed error object is kept as received, so
/// the call it answers still fails instead of waiting forever.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ResponseError {
    Rpc(RpcError),
    Malformed(Value),
}

/// An inbound JSON-RPC response.
///
/// `id` is optional so notifications parse; they are dropped by the
/// correlator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<RequestId>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ResponseError>,
}

impl JsonRpcResponse {
    /// Split into the call outcome. A missing result resolves to `null`.
    pub fn into_outcome(self) -> Result<Value, ClientError> {
        match self.error {
            Some(ResponseError::Rpc(err)) => Err(ClientError::Rpc(err)),
            Some(ResponseError::Malformed(raw)) => Err(ClientError::Protocol(format!(
                "Malformed error object: {}",
                raw
            ))),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}
