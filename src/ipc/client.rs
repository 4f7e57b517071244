//! Socket client for JSON-RPC 2.0 calls to the Lightning daemon.
//!
//! `LightningClient` is a cheap, cloneable handle. The connection itself
//! lives in a background task (see [`super::connection`]) that reconnects on
//! its own, so a call made while the daemon is unreachable simply waits.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::trace;

use super::backoff::Backoff;
use super::connection::{ClientEvent, Command, ConnectionManager, ConnectionState};
use super::transport::{Connector, UnixConnector};
use crate::config::ClientConfig;
use crate::discovery::resolve_rpc_path;
use crate::error::ClientError;
use crate::protocol::{JsonRpcRequest, Params, RequestId};

/// Buffered events per subscriber before the oldest are dropped.
const EVENT_CAPACITY: usize = 64;

/// Client for the Lightning daemon's RPC socket.
///
/// # Connection Lifecycle
///
/// - `new()` / `with_config()` - Resolve the socket path and start the
///   connection task; returns immediately
/// - `call()` - Queue a request and wait for its response
/// - dropping the last clone stops the connection task
///
/// # Example
///
/// ```ignore
/// use lightning_client::LightningClient;
/// use serde_json::json;
///
/// let client = LightningClient::new("/home/user/.lightning/regtest")?;
///
/// let info = client.call("getinfo", ()).await?;
/// let channels = client
///     .call("listchannels", vec![json!(null), info["id"].clone()])
///     .await?;
/// ```
#[derive(Clone)]
pub struct LightningClient {
    commands: mpsc::UnboundedSender<Command>,
    /// Monotonically increasing request ID counter, shared by clones.
    next_id: Arc<AtomicU64>,
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<ClientEvent>,
    target: String,
    request_timeout: Option<Duration>,
}

impl LightningClient {
    /// Create a client for the socket at (or under) `rpc_path`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidPath` if the path is relative and
    /// `ClientError::NoRuntime` outside a tokio runtime. An unreachable
    /// daemon is not an error here.
    pub fn new(rpc_path: impl AsRef<Path>) -> Result<Self, ClientError> {
        Self::with_config(ClientConfig::new(rpc_path.as_ref()))
    }

    pub fn with_config(config: ClientConfig) -> Result<Self, ClientError> {
        let socket = resolve_rpc_path(&config.rpc_path)?;
        Self::with_connector(UnixConnector::new(socket), &config)
    }

    /// Create a client over any [`Connector`]. `config.rpc_path` is ignored.
    pub fn with_connector<C: Connector>(
        connector: C,
        config: &ClientConfig,
    ) -> Result<Self, ClientError> {
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        let target = connector.describe();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let manager = ConnectionManager::new(
            connector,
            Backoff::new(config.backoff),
            commands_rx,
            state_tx,
            events_tx.clone(),
        );
        runtime.spawn(manager.run());

        Ok(Self {
            commands: commands_tx,
            next_id: Arc::new(AtomicU64::new(1)),
            state: state_rx,
            events: events_tx,
            target,
            request_timeout: config.request_timeout,
        })
    }

    /// Send a JSON-RPC 2.0 request and wait for its response.
    ///
    /// The request is written as soon as a connection is available, in
    /// issue order. Without a configured timeout the call waits through
    /// any number of reconnects.
    ///
    /// # Errors
    ///
    /// - `ClientError::Rpc` if the daemon returned an error object
    /// - `ClientError::Timeout` if a request timeout is configured and hit
    /// - `ClientError::Closed` if the connection task has stopped
    pub async fn call(
        &self,
        method: &str,
        params: impl Into<Params>,
    ) -> Result<Value, ClientError> {
        let id = self.next_id();
        let request = JsonRpcRequest::new(method, params.into(), id.clone());
        trace!("#{} --> {} {:?}", id, method, request.params);

        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Call { request, reply })
            .map_err(|_| ClientError::Closed)?;

        let Some(limit) = self.request_timeout else {
            return response.await.map_err(|_| ClientError::Closed)?;
        };

        match timeout(limit, response).await {
            Ok(outcome) => outcome.map_err(|_| ClientError::Closed)?,
            Err(_) => {
                let _ = self.commands.send(Command::Forget { id });
                Err(ClientError::Timeout(limit))
            }
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

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the connection task reports a live connection.
    pub async fn wait_connected(&self) -> Result<(), ClientError> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::Closed)
    }

    /// Subscribe to connection and framing events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// What this client connects to (the resolved socket path).
    pub fn target(&self) -> &str {
        &self.target
    }

    fn next_id(&self) -> RequestId {
        RequestId::from(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackoffConfig;
    use crate::ipc::DisconnectReason;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{
        AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadBuf,
        ReadHalf, WriteHalf,
    };
    use tokio::sync::Mutex;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Hands out streams queued by the test, one per connect.
    struct StreamConnector<S> {
        streams: Mutex<mpsc::UnboundedReceiver<S>>,
    }

    type DuplexConnector = StreamConnector<DuplexStream>;

    impl<S> Connector for StreamConnector<S>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        type Stream = S;

        async fn connect(&self) -> io::Result<S> {
            self.streams.lock().await.recv().await.ok_or_else(|| {
                io::Error::new(io::ErrorKind::ConnectionRefused, "no more streams")
            })
        }

        fn describe(&self) -> String {
            "duplex".to_string()
        }
    }

    /// In-memory stream that can be told to refuse every write.
    struct FlakyStream {
        inner: DuplexStream,
        refuse_writes: bool,
    }

    impl AsyncRead for FlakyStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for FlakyStream {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.refuse_writes {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "write refused",
                )));
            }
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    /// The daemon's side of one connection.
    struct FakeDaemon {
        lines: tokio::io::Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl FakeDaemon {
        fn new(stream: DuplexStream) -> Self {
            let (reader, writer) = tokio::io::split(stream);
            Self {
                lines: BufReader::new(reader).lines(),
                writer,
            }
        }

        async fn read_request(&mut self) -> String {
            timeout(TEST_TIMEOUT, self.lines.next_line())
                .await
                .expect("Test timed out")
                .expect("Read failed")
                .expect("Client closed the stream")
        }

        async fn send(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
            self.writer.flush().await.unwrap();
        }
    }

    fn fast_config() -> ClientConfig {
        ClientConfig::new("/unused").with_backoff(BackoffConfig {
            initial: Duration::from_millis(5),
            floor: Duration::from_millis(10),
            ceiling: Duration::from_millis(40),
        })
    }

    fn duplex_client(config: &ClientConfig) -> (LightningClient, mpsc::UnboundedSender<DuplexStream>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = DuplexConnector {
            streams: Mutex::new(rx),
        };
        let client = LightningClient::with_connector(connector, config).unwrap();
        (client, tx)
    }

    fn connect_daemon(streams: &mpsc::UnboundedSender<DuplexStream>) -> FakeDaemon {
        let (client_side, daemon_side) = tokio::io::duplex(64 * 1024);
        streams.send(client_side).unwrap();
        FakeDaemon::new(daemon_side)
    }

    async fn next_disconnect(events: &mut broadcast::Receiver<ClientEvent>) -> DisconnectReason {
        timeout(TEST_TIMEOUT, async {
            loop {
                if let ClientEvent::Disconnected { reason, .. } = events.recv().await.unwrap() {
                    return reason;
                }
            }
        })
        .await
        .expect("No disconnect event")
    }

    #[tokio::test]
    async fn test_getinfo_round_trip() {
        let (client, streams) = duplex_client(&fast_config());
        let mut daemon = connect_daemon(&streams);

        let call = tokio::spawn({
            let client = client.clone();
            async move { client.call("getinfo", ()).await }
        });

        let line = daemon.read_request().await;
        assert_eq!(
            line,
            r#"{"jsonrpc":"2.0","method":"getinfo","params":{},"id":"1"}"#
        );
        daemon.send(r#"{"id":"1","result":{"id":"03abc"}}"#).await;

        let result = timeout(TEST_TIMEOUT, call).await.unwrap().unwrap().unwrap();
        assert_eq!(result, json!({"id": "03abc"}));
    }

    #[tokio::test]
    async fn test_ids_increase_per_call() {
        let (client, streams) = duplex_client(&fast_config());
        let mut daemon = connect_daemon(&streams);

        for expected in 1..=3u64 {
            let call = tokio::spawn({
                let client = client.clone();
                async move { client.call("ping", ()).await }
            });
            let request: Value = serde_json::from_str(&daemon.read_request().await).unwrap();
            assert_eq!(request["id"], json!(expected.to_string()));
            daemon
                .send(&format!(r#"{{"id":"{}","result":{{}}}}"#, expected))
                .await;
            timeout(TEST_TIMEOUT, call).await.unwrap().unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_call_waits_for_first_connection() {
        let (client, streams) = duplex_client(&fast_config());
        assert_ne!(client.state(), ConnectionState::Connected);

        let call = tokio::spawn({
            let client = client.clone();
            async move { client.call("getinfo", ()).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!call.is_finished());

        let mut daemon = connect_daemon(&streams);
        timeout(TEST_TIMEOUT, client.wait_connected())
            .await
            .unwrap()
            .unwrap();

        let request: Value = serde_json::from_str(&daemon.read_request().await).unwrap();
        assert_eq!(request["method"], json!("getinfo"));
        daemon.send(r#"{"id":"1","result":{}}"#).await;

        assert_eq!(
            timeout(TEST_TIMEOUT, call).await.unwrap().unwrap().unwrap(),
            json!({})
        );
    }

    #[tokio::test]
    async fn test_rpc_error_rejects_call() {
        let (client, streams) = duplex_client(&fast_config());
        let mut daemon = connect_daemon(&streams);

        let call = tokio::spawn({
            let client = client.clone();
            async move { client.call("pay", vec![json!("lnbc1...")]).await }
        });

        daemon.read_request().await;
        daemon
            .send(r#"{"id":"1","error":{"code":-1,"message":"bad args"}}"#)
            .await;

        let err = timeout(TEST_TIMEOUT, call).await.unwrap().unwrap().unwrap_err();
        assert!(err.is_rpc());
        let rpc = err.rpc_error().unwrap();
        assert_eq!(rpc.code, -1);
        assert_eq!(rpc.message, "bad args");
    }

    #[tokio::test]
    async fn test_pending_call_survives_reconnect() {
        let (client, streams) = duplex_client(&fast_config());
        let mut events = client.subscribe();
        let mut first = connect_daemon(&streams);

        let call = tokio::spawn({
            let client = client.clone();
            async move { client.call("waitanyinvoice", ()).await }
        });
        first.read_request().await;

        // Daemon goes away without answering.
        drop(first);

        assert_eq!(next_disconnect(&mut events).await, DisconnectReason::Closed);
        assert!(!call.is_finished());

        let mut second = connect_daemon(&streams);
        timeout(TEST_TIMEOUT, client.wait_connected())
            .await
            .unwrap()
            .unwrap();
        second.send(r#"{"id":"1","result":{"label":"x"}}"#).await;

        assert_eq!(
            timeout(TEST_TIMEOUT, call).await.unwrap().unwrap().unwrap(),
            json!({"label": "x"})
        );
    }

    #[tokio::test]
    async fn test_calls_issued_during_outage_written_in_order() {
        let (client, streams) = duplex_client(&fast_config());
        let mut events = client.subscribe();
        let mut first = connect_daemon(&streams);

        let in_flight = tokio::spawn({
            let client = client.clone();
            async move { client.call("waitanyinvoice", ()).await }
        });
        first.read_request().await;
        drop(first);
        assert_eq!(next_disconnect(&mut events).await, DisconnectReason::Closed);

        let queued: Vec<_> = ["listpeers", "listfunds", "listinvoices"]
            .into_iter()
            .map(|method| {
                let client = client.clone();
                tokio::spawn(async move { client.call(method, ()).await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(queued.iter().all(|call| !call.is_finished()));

        let mut second = connect_daemon(&streams);
        let mut requests = Vec::new();
        for _ in 0..3 {
            let request: Value = serde_json::from_str(&second.read_request().await).unwrap();
            requests.push(request);
        }
        let ids: Vec<&Value> = requests.iter().map(|r| &r["id"]).collect();
        assert_eq!(ids, vec![&json!("2"), &json!("3"), &json!("4")]);

        for request in requests.iter().rev() {
            second
                .send(&json!({"id": request["id"], "result": request["method"]}).to_string())
                .await;
        }
        second.send(r#"{"id":"1","result":"paid"}"#).await;

        let mut methods = Vec::new();
        for call in queued {
            let result = timeout(TEST_TIMEOUT, call).await.unwrap().unwrap().unwrap();
            methods.push(result);
        }
        methods.sort_by_key(|m| m.to_string());
        assert_eq!(
            methods,
            vec![json!("listfunds"), json!("listinvoices"), json!("listpeers")]
        );
        assert_eq!(
            timeout(TEST_TIMEOUT, in_flight).await.unwrap().unwrap().unwrap(),
            json!("paid")
        );
    }

    #[tokio::test]
    async fn test_failed_write_is_resent_on_next_connection() {
        let (streams, rx) = mpsc::unbounded_channel::<FlakyStream>();
        let connector = StreamConnector {
            streams: Mutex::new(rx),
        };
        let client = LightningClient::with_connector(connector, &fast_config()).unwrap();
        let mut events = client.subscribe();

        // The first connection stays readable but refuses every write.
        let (broken_side, _broken_daemon) = tokio::io::duplex(1024);
        streams
            .send(FlakyStream {
                inner: broken_side,
                refuse_writes: true,
            })
            .unwrap();

        let call = tokio::spawn({
            let client = client.clone();
            async move { client.call("getinfo", ()).await }
        });

        let reason = next_disconnect(&mut events).await;
        assert!(
            matches!(
                reason,
                DisconnectReason::Error {
                    kind: io::ErrorKind::BrokenPipe,
                    ..
                }
            ),
            "Unexpected reason: {:?}",
            reason
        );
        assert!(!call.is_finished());

        let (client_side, daemon_side) = tokio::io::duplex(64 * 1024);
        streams
            .send(FlakyStream {
                inner: client_side,
                refuse_writes: false,
            })
            .unwrap();
        let mut daemon = FakeDaemon::new(daemon_side);

        assert_eq!(
            daemon.read_request().await,
            r#"{"jsonrpc":"2.0","method":"getinfo","params":{},"id":"1"}"#
        );
        daemon.send(r#"{"id":"1","result":"ok"}"#).await;

        assert_eq!(
            timeout(TEST_TIMEOUT, call).await.unwrap().unwrap().unwrap(),
            json!("ok")
        );
    }

    #[tokio::test]
    async fn test_malformed_error_object_fails_its_call() {
        let (client, streams) = duplex_client(&fast_config());
        let mut daemon = connect_daemon(&streams);

        let call = tokio::spawn({
            let client = client.clone();
            async move { client.call("fundchannel", ()).await }
        });
        daemon.read_request().await;
        daemon.send(r#"{"id":"1","error":{"code":-32602}}"#).await;

        let err = timeout(TEST_TIMEOUT, call).await.unwrap().unwrap().unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)), "got {:?}", err);
        assert!(err.to_string().contains("-32602"));

        let call = tokio::spawn({
            let client = client.clone();
            async move { client.call("close", ()).await }
        });
        daemon.read_request().await;
        daemon.send(r#"{"id":"2","error":"channel busy"}"#).await;

        let err = timeout(TEST_TIMEOUT, call).await.unwrap().unwrap().unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)), "got {:?}", err);
        assert_eq!(client.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_malformed_line_reported_and_stream_continues() {
        let (client, streams) = duplex_client(&fast_config());
        let mut events = client.subscribe();
        let mut daemon = connect_daemon(&streams);

        let call = tokio::spawn({
            let client = client.clone();
            async move { client.call("getinfo", ()).await }
        });
        daemon.read_request().await;
        daemon.send("this is not json").await;
        daemon.send(r#"{"id":"1","result":"ok"}"#).await;

        assert_eq!(
            timeout(TEST_TIMEOUT, call).await.unwrap().unwrap().unwrap(),
            json!("ok")
        );

        let framing = timeout(TEST_TIMEOUT, async {
            loop {
                if let ClientEvent::FramingError { line, .. } = events.recv().await.unwrap() {
                    return line;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(framing, "this is not json");
    }

    #[tokio::test]
    async fn test_timeout_forgets_pending_call() {
        let config = fast_config().with_request_timeout(Duration::from_millis(50));
        let (client, streams) = duplex_client(&config);
        let mut daemon = connect_daemon(&streams);

        let err = client.call("waitinvoice", vec![json!("label")]).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout(_)));
        daemon.read_request().await;

        // A late answer for the abandoned id must not disturb the next call.
        daemon.send(r#"{"id":"1","result":"late"}"#).await;

        let call = tokio::spawn({
            let client = client.clone();
            async move { client.call("getinfo", ()).await }
        });
        let request: Value = serde_json::from_str(&daemon.read_request().await).unwrap();
        assert_eq!(request["id"], json!("2"));
        daemon.send(r#"{"id":"2","result":"fresh"}"#).await;

        assert_eq!(
            timeout(TEST_TIMEOUT, call).await.unwrap().unwrap().unwrap(),
            json!("fresh")
        );
    }

    #[tokio::test]
    async fn test_call_as_decodes_result() {
        #[derive(serde::Deserialize)]
        struct Info {
            id: String,
        }

        let (client, streams) = duplex_client(&fast_config());
        let mut daemon = connect_daemon(&streams);

        let call = tokio::spawn({
            let client = client.clone();
            async move { client.call_as::<Info>("getinfo", ()).await }
        });
        daemon.read_request().await;
        daemon.send(r#"{"id":"1","result":{"id":"03abc","alias":"x"}}"#).await;

        let info = timeout(TEST_TIMEOUT, call).await.unwrap().unwrap().unwrap();
        assert_eq!(info.id, "03abc");
    }

    #[test]
    fn test_requires_runtime() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let connector = DuplexConnector {
            streams: Mutex::new(rx),
        };
        let result = LightningClient::with_connector(connector, &fast_config());
        assert!(matches!(result, Err(ClientError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_relative_path_fails_at_construction() {
        let result = LightningClient::new("relative/lightning-rpc");
        assert!(matches!(result, Err(ClientError::InvalidPath { .. })));
    }
}
