//! The connection task.
//!
//! A single task owns the transport, the reconnect backoff and the pending
//! call table. Callers talk to it through a command channel; it talks back
//! through each call's oneshot, a `watch` of the connection state and a
//! `broadcast` of [`ClientEvent`]s. Nothing here is shared-mutable, and at
//! most one reconnect wait is ever outstanding because the loop below is the
//! only place that sleeps.
//!
//! ```text
//!   Disconnected ──connect()──► Connecting ──ok──► Connected
//!        ▲                          │                  │
//!        └──── backoff wait ◄───────┴──err──  EOF/err ─┘
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWrite, BufReader};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::correlator::{Correlator, PendingCall, Reply};
use super::framing;
use super::transport::Connector;
use crate::error::ClientError;
use crate::protocol::{JsonRpcRequest, RequestId};

/// Connection state as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Why a connection attempt failed or a live connection went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The daemon closed the stream.
    Closed,
    /// Connecting, reading or writing failed.
    Error { kind: io::ErrorKind, message: String },
}

impl From<io::Error> for DisconnectReason {
    fn from(err: io::Error) -> Self {
        DisconnectReason::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Closed => f.write_str("connection closed by daemon"),
            DisconnectReason::Error { message, .. } => f.write_str(message),
        }
    }
}

/// Events published by the connection task. None of them are fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    /// The connection was lost or could not be made; a reconnect is
    /// scheduled after `retry_in`.
    Disconnected {
        reason: DisconnectReason,
        retry_in: Duration,
    },
    /// An inbound line could not be parsed. It cannot be attributed to any
    /// call, so it is only reported here.
    FramingError { line: String, message: String },
}

pub(crate) enum Command {
    Call { request: JsonRpcRequest, reply: Reply },
    Forget { id: RequestId },
}

enum Outcome {
    Lost(DisconnectReason),
    Shutdown,
}

enum Inbound {
    Command(Option<Command>),
    Line(io::Result<Option<String>>),
}

/// Registered calls plus the requests not yet written.
#[derive(Default)]
struct Calls {
    correlator: Correlator,
    /// Requests waiting for a live connection, in issue order.
    backlog: VecDeque<JsonRpcRequest>,
}

impl Calls {
    fn enqueue(&mut self, command: Command) {
        match command {
            Command::Call { request, reply } => {
                let call = PendingCall::new(request.method.clone(), reply);
                if self.correlator.register(request.id.clone(), call) {
                    self.backlog.push_back(request);
                }
            }
            Command::Forget { id } => {
                if self.correlator.forget(&id) {
                    debug!("#{} abandoned after timeout", id);
                }
                self.backlog.retain(|request| request.id != id);
            }
        }
    }

    /// Write every queued request in order. A request that fails to write
    /// goes back to the head of the queue for the next connection; one that
    /// cannot be encoded fails its caller instead.
    async fn flush<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(request) = self.backlog.pop_front() {
            let line = match framing::encode_request(&request) {
                Ok(line) => line,
                Err(err) => {
                    warn!("#{} {} could not be encoded: {}", request.id, request.method, err);
                    self.correlator.reject(
                        &request.id,
                        ClientError::Protocol(format!(
                            "Failed to encode {} request: {}",
                            request.method, err
                        )),
                    );
                    continue;
                }
            };

            debug!("#{} --> {}", request.id, request.method);
            if let Err(err) = framing::write_line(writer, &line).await {
                self.backlog.push_front(request);
                return Err(err);
            }
        }
        Ok(())
    }
}

pub(crate) struct ConnectionManager<C: Connector> {
    connector: C,
    backoff: Backoff,
    calls: Calls,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ClientEvent>,
}

impl<C: Connector> ConnectionManager<C> {
    pub(crate) fn new(
        connector: C,
        backoff: Backoff,
        commands: mpsc::UnboundedReceiver<Command>,
        state: watch::Sender<ConnectionState>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            connector,
            backoff,
            calls: Calls::default(),
            commands,
            state,
            events,
        }
    }

    /// Drive the connection until every client handle is dropped.
    pub(crate) async fn run(mut self) {
        let target = self.connector.describe();

        loop {
            self.state.send_replace(ConnectionState::Connecting);
            debug!("Connecting to {}", target);

            let outcome = match self.connect().await {
                None => Outcome::Shutdown,
                Some(Ok(stream)) => {
                    info!("Lightning client connected to {}", target);
                    self.backoff.on_connected();
                    self.state.send_replace(ConnectionState::Connected);
                    let _ = self.events.send(ClientEvent::Connected);
                    self.serve(stream).await
                }
                Some(Err(err)) => Outcome::Lost(err.into()),
            };

            let reason = match outcome {
                Outcome::Shutdown => break,
                Outcome::Lost(reason) => reason,
            };

            self.state.send_replace(ConnectionState::Disconnected);
            let retry_in = self.backoff.on_failure();
            match &reason {
                DisconnectReason::Closed => {
                    warn!("Lightning client connection closed, reconnecting in {:?}", retry_in)
                }
                DisconnectReason::Error { message, .. } => warn!(
                    "Lightning client connection error: {}, reconnecting in {:?}",
                    message, retry_in
                ),
            }
            let _ = self.events.send(ClientEvent::Disconnected { reason, retry_in });

            if !self.wait_for_retry(retry_in).await {
                break;
            }
            debug!("Trying to reconnect...");
        }

        self.state.send_replace(ConnectionState::Disconnected);
        if !self.calls.correlator.is_empty() {
            debug!(
                pending = self.calls.correlator.len(),
                "Dropping calls still waiting for a response"
            );
        }
        debug!("Lightning client connection task stopped");
    }

    /// Attempt one connection while still accepting calls.
    ///
    /// Returns `None` once the command channel is closed.
    async fn connect(&mut self) -> Option<io::Result<C::Stream>> {
        let attempt = self.connector.connect();
        tokio::pin!(attempt);

        loop {
            tokio::select! {
                result = &mut attempt => return Some(result),
                command = self.commands.recv() => match command {
                    Some(command) => self.calls.enqueue(command),
                    None => return None,
                },
            }
        }
    }

    /// Sleep out the backoff while still accepting calls.
    ///
    /// Returns `false` once the command channel is closed.
    async fn wait_for_retry(&mut self, wait: Duration) -> bool {
        let sleep = tokio::time::sleep(wait);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(command) => self.calls.enqueue(command),
                    None => return false,
                },
            }
        }
    }

    async fn serve(&mut self, stream: C::Stream) -> Outcome {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut lines = BufReader::new(reader).lines();

        loop {
            if let Err(err) = self.calls.flush(&mut writer).await {
                return Outcome::Lost(err.into());
            }

            let inbound = tokio::select! {
                command = self.commands.recv() => Inbound::Command(command),
                line = lines.next_line() => Inbound::Line(line),
            };

            match inbound {
                Inbound::Command(None) => return Outcome::Shutdown,
                Inbound::Command(Some(command)) => self.calls.enqueue(command),
                Inbound::Line(Ok(Some(line))) => self.handle_line(&line),
                Inbound::Line(Ok(None)) => return Outcome::Lost(DisconnectReason::Closed),
                Inbound::Line(Err(err)) if err.kind() == io::ErrorKind::InvalidData => {
                    self.report_framing_error(String::new(), err.to_string());
                }
                Inbound::Line(Err(err)) => return Outcome::Lost(err.into()),
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        match framing::parse_line(line) {
            Ok(None) => {}
            Ok(Some(response)) => {
                self.calls.correlator.dispatch(response);
            }
            Err(err) => {
                let message = err.source.to_string();
                self.report_framing_error(err.line, message);
            }
        }
    }

    fn report_framing_error(&self, line: String, message: String) {
        warn!("Lightning client received a malformed line: {}", message);
        let _ = self.events.send(ClientEvent::FramingError { line, message });
    }
}
