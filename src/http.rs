//! REST transport for the Lightning daemon.
//!
//! Each call is a one-shot `POST <base>/v1/<method>` with the parameters as
//! the JSON body and the credential in a header. There is no persistent
//! connection to manage and no envelope: a successful response body is the
//! result itself.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::config::HttpConfig;
use crate::error::ClientError;
use crate::protocol::{Params, RpcError};

/// Error body shapes the REST endpoint may return.
#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Wrapped { error: RpcError },
    Bare(RpcError),
}

impl From<ErrorBody> for RpcError {
    fn from(body: ErrorBody) -> Self {
        match body {
            ErrorBody::Wrapped { error } => error,
            ErrorBody::Bare(error) => error,
        }
    }
}

/// Client for the daemon's REST endpoint.
///
/// # Example
///
/// ```ignore
/// use lightning_client::{HttpClient, HttpConfig};
///
/// let url = "https://127.0.0.1:3010".parse()?;
/// let client = HttpClient::new(HttpConfig::new(url, rune))?;
/// let info = client.call("getinfo", ()).await?;
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
    credential: String,
    header: String,
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns `ClientError::Http` if the HTTP client cannot be built.
    pub fn new(config: HttpConfig) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(limit) = config.request_timeout {
            builder = builder.timeout(limit);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: config.base_url,
            credential: config.credential,
            header: config.header,
        })
    }

    /// Endpoint URL for `method`.
    pub fn method_url(&self, method: &str) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidPath {
                path: self.base_url.as_str().into(),
                reason: "the REST base URL cannot carry a path",
            })?
            .pop_if_empty()
            .extend(["v1", method]);
        Ok(url)
    }

    /// Invoke `method` and return its result.
    ///
    /// # Errors
    ///
    /// - `ClientError::Rpc` if the daemon answered with an error object
    /// - `ClientError::HttpStatus` for other non-success statuses
    /// - `ClientError::Http` if the exchange itself failed
    /// - `ClientError::Protocol` if a success body is not JSON
    pub async fn call(
        &self,
        method: &str,
        params: impl Into<Params>,
    ) -> Result<Value, ClientError> {
        let url = self.method_url(method)?;
        let body = params.into().into_value();
        debug!("--> POST {}", url);
        trace!("--> {} {}", method, body);

        let response = self
            .http
            .post(url)
            .header(self.header.as_str(), self.credential.as_str())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        debug!("<-- {} {}", method, status);

        if status.is_success() {
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Ok(Value::Null);
            }
            return serde_json::from_slice(&bytes).map_err(|e| {
                ClientError::Protocol(format!("Failed to parse {} response: {}", method, e))
            });
        }

        match serde_json::from_slice::<ErrorBody>(&bytes) {
            Ok(body) => Err(ClientError::Rpc(body.into())),
            Err(_) => Err(ClientError::HttpStatus {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            }),
        }
    }

    /// Like [`call`](Self::call), decoding the result into `T`.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: impl Into<Params>,
    ) -> Result<T, ClientError> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| ClientError::Protocol(format!("Unexpected result for {}: {}", method, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> HttpClient {
        HttpClient::new(HttpConfig::new(Url::parse(base).unwrap(), "rune")).unwrap()
    }

    #[test]
    fn test_method_url_from_root() {
        let url = client("https://127.0.0.1:3010").method_url("getinfo").unwrap();
        assert_eq!(url.as_str(), "https://127.0.0.1:3010/v1/getinfo");
    }

    #[test]
    fn test_method_url_keeps_base_path() {
        let url = client("http://node.local/lightning/").method_url("listfunds").unwrap();
        assert_eq!(url.as_str(), "http://node.local/lightning/v1/listfunds");
    }

    #[test]
    fn test_error_body_shapes() {
        let bare: ErrorBody =
            serde_json::from_str(r#"{"code":-32602,"message":"missing label"}"#).unwrap();
        assert_eq!(RpcError::from(bare).code, -32602);

        let wrapped: ErrorBody =
            serde_json::from_str(r#"{"error":{"code":205,"message":"no route"}}"#).unwrap();
        assert_eq!(RpcError::from(wrapped).message, "no route");
    }
}
