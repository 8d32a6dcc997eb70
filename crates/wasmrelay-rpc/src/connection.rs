//! The one physical socket behind a client.
//!
//! Dials lazily on first use, serializes every write behind one lock, and
//! never reconnects: once the router exits, the connection stays dead.

use futures::SinkExt;
use futures::stream::{SplitSink, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::registry::Command;
use crate::router;
use crate::types::RpcRequest;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Cloneable handle for sending commands to the router task.
#[derive(Clone, Debug)]
pub(crate) struct RouterHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl RouterHandle {
    /// Queue a command; fails once the router has exited.
    pub fn send(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::ConnectionLost)
    }

    /// Guard that abandons slot `id` unless disarmed before it drops.
    pub fn guard(&self, id: impl Into<String>) -> SlotGuard<'_> {
        SlotGuard {
            router: self,
            id: Some(id.into()),
        }
    }
}

/// Keeps a registered slot from outliving a caller that stopped waiting.
pub(crate) struct SlotGuard<'a> {
    router: &'a RouterHandle,
    id: Option<String>,
}

impl SlotGuard<'_> {
    /// The wait finished; the router has already released the slot.
    pub fn disarm(mut self) {
        self.id = None;
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            debug!(request_id = %id, "abandoning slot");
            let _ = self.router.send(Command::Abandon { id });
        }
    }
}

/// A dialed connection with its router task.
struct Live {
    sink: WsSink,
    router: RouterHandle,
    reader: JoinHandle<()>,
}

enum State {
    Idle,
    Live(Live),
    Closed,
}

/// Owns the socket: lazy dial, serialized writes, close.
pub(crate) struct ConnectionManager {
    url: String,
    state: Mutex<State>,
    shutdown: CancellationToken,
    link: CancellationToken,
}

impl ConnectionManager {
    /// A manager for `url` that has not dialed yet.
    pub fn new(url: impl Into<String>, shutdown: CancellationToken) -> Self {
        Self {
            url: url.into(),
            state: Mutex::new(State::Idle),
            link: shutdown.child_token(),
            shutdown,
        }
    }

    /// Cancelled once the connection is over: on close, or when the router
    /// exits after the node goes away.
    pub fn link(&self) -> CancellationToken {
        self.link.clone()
    }

    fn is_alive(&self) -> bool {
        !self.link.is_cancelled()
    }

    /// Endpoint this manager dials.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Dial on first call; later calls return the live router.
    pub async fn ensure_connected(&self) -> Result<RouterHandle, ClientError> {
        let mut state = self.state.lock().await;
        match &*state {
            State::Live(live) if self.is_alive() => {
                return Ok(live.router.clone());
            }
            State::Live(_) => return Err(ClientError::ConnectionLost),
            State::Closed => return Err(ClientError::ConnectionClosed),
            State::Idle => {}
        }
        if self.shutdown.is_cancelled() {
            return Err(ClientError::ConnectionClosed);
        }

        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ClientError::Connect {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;
        let (sink, source) = ws.split();
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(router::run(source, commands_rx, self.link.clone()));
        let router = RouterHandle { commands };
        info!(url = %self.url, "websocket connection opened");
        *state = State::Live(Live {
            sink,
            router: router.clone(),
            reader,
        });
        Ok(router)
    }

    /// Send one request frame. Writers never interleave.
    pub async fn write(&self, request: &RpcRequest) -> Result<(), ClientError> {
        let text =
            serde_json::to_string(request).map_err(|e| ClientError::Encode(e.to_string()))?;
        let mut state = self.state.lock().await;
        let live = match &mut *state {
            State::Live(live) if self.is_alive() => live,
            State::Live(_) => return Err(ClientError::ConnectionLost),
            State::Idle | State::Closed => return Err(ClientError::ConnectionClosed),
        };
        debug!(method = %request.method, request_id = %request.id, "sending request");
        live.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ClientError::Write(e.to_string()))
    }

    /// Stop the router and close the socket. A no-op when never dialed.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let previous = std::mem::replace(&mut *self.state.lock().await, State::Closed);
        let State::Live(mut live) = previous else {
            return;
        };
        if let Err(e) = live.sink.close().await {
            debug!(error = %e, "websocket close handshake failed");
        }
        if let Err(e) = live.reader.await {
            warn!(error = %e, "router task ended abnormally");
        }
        info!(url = %self.url, "websocket connection closed");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
