//! Newline-delimited JSON framing for the daemon socket.
//!
//! # Wire Format
//!
//! ```text
//! {"jsonrpc":"2.0","method":"getinfo","params":{},"id":"1"}\n
//! {"id":"1","result":{...}}\n
//! ```
//!
//! One JSON document per line. Blank lines between documents are skipped.
//! A line that does not parse is reported as a [`FramingError`] and does not
//! stop the stream.

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::protocol::{JsonRpcRequest, JsonRpcResponse};

/// Longest line kept verbatim in a framing error.
const MAX_REPORTED_LINE: usize = 256;

/// A single inbound line that could not be turned into a response.
#[derive(Debug, Error)]
#[error("Malformed JSON-RPC line ({source}): {line}")]
pub struct FramingError {
    /// The offending line, truncated for reporting.
    pub line: String,
    #[source]
    pub source: serde_json::Error,
}

impl FramingError {
    fn new(line: &str, source: serde_json::Error) -> Self {
        let line = match line.char_indices().nth(MAX_REPORTED_LINE) {
            Some((cut, _)) => format!("{}...", &line[..cut]),
            None => line.to_string(),
        };
        Self { line, source }
    }
}

/// Parse one inbound line.
///
/// Returns `Ok(None)` for empty or whitespace-only lines.
pub fn parse_line(line: &str) -> Result<Option<JsonRpcResponse>, FramingError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| FramingError::new(trimmed, e))
}

/// Serialize a request into exactly one line, newline included.
///
/// `serde_json` escapes control characters inside strings, so the encoded
/// document never contains a raw newline.
pub fn encode_request(request: &JsonRpcRequest) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    Ok(line)
}

/// Write one encoded line and flush it.
///
/// The line is handed to the writer in one `write_all` so concurrent
/// traffic cannot interleave inside it.
pub async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
