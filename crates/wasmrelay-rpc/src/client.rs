//! Client entry point.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::connection::ConnectionManager;
use crate::error::ClientError;
use crate::head_tracker::HEAD_TRACKER_ID;

/// How long `close` waits for the head tracker to unsubscribe.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Client construction parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// WebSocket endpoint, e.g. `ws://127.0.0.1:26657/websocket`.
    pub url: String,
}

impl ClientConfig {
    /// Config for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Multiplexed Tendermint RPC client over one WebSocket.
///
/// Subscriptions, queries and broadcasts share the socket. Every call blocks
/// until its own reply arrives, the connection drops, or [`close`] runs.
/// There is no reconnect: after the connection is lost, construct a new
/// client.
///
/// [`close`]: TendermintClient::close
pub struct TendermintClient {
    pub(crate) connection: ConnectionManager,
    pub(crate) shutdown: CancellationToken,
    sequence: AtomicU64,
    pub(crate) heights: Arc<watch::Sender<u64>>,
    pub(crate) head_tracker: AtomicBool,
}

impl TendermintClient {
    /// Build a client. Nothing is dialed until the first call.
    pub fn new(config: ClientConfig) -> Self {
        let shutdown = CancellationToken::new();
        let (heights, _) = watch::channel(0);
        Self {
            connection: ConnectionManager::new(config.url, shutdown.clone()),
            shutdown,
            sequence: AtomicU64::new(1),
            heights: Arc::new(heights),
            head_tracker: AtomicBool::new(false),
        }
    }

    /// Build a client, connect, and start the head tracker.
    pub async fn start(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Self::new(config);
        client.start_head_tracker().await?;
        Ok(client)
    }

    /// Endpoint this client talks to.
    pub fn url(&self) -> &str {
        self.connection.url()
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Unique correlation id for one call of `method`.
    pub(crate) fn next_request_id(&self, method: &str) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{method}#{seq}")
    }

    /// Wait on a router reply, giving up when the client closes.
    pub(crate) async fn wait<T>(
        &self,
        rx: oneshot::Receiver<Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        tokio::select! {
            () = self.shutdown.cancelled() => Err(ClientError::ConnectionClosed),
            outcome = rx => outcome.unwrap_or(Err(ClientError::ConnectionClosed)),
        }
    }

    /// Tear down the head tracker, stop the router and close the socket.
    ///
    /// Releases every blocked caller with [`ClientError::ConnectionClosed`].
    /// Safe to call more than once, and on a client that never connected.
    pub async fn close(&self) {
        if self.is_closed() {
            return;
        }
        if self.head_tracker.swap(false, Ordering::AcqRel) {
            match tokio::time::timeout(CLOSE_GRACE, self.unsubscribe(HEAD_TRACKER_ID)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "head tracker unsubscribe failed"),
                Err(_) => warn!("head tracker unsubscribe timed out"),
            }
        }
        self.connection.close().await;
        info!(url = %self.url(), "client closed");
    }
}

impl std::fmt::Debug for TendermintClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TendermintClient")
            .field("url", &self.url())
            .field("closed", &self.is_closed())
            .field("height", &*self.heights.borrow())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn client() -> TendermintClient {
        TendermintClient::new(ClientConfig::new("ws://127.0.0.1:1/websocket"))
    }

    #[test]
    fn request_ids_are_unique_per_call() {
        let client = client();
        let a = client.next_request_id("abci_query");
        let b = client.next_request_id("abci_query");
        assert_ne!(a, b);
        assert!(a.starts_with("abci_query#"));
    }

    #[tokio::test]
    async fn close_releases_waiters() {
        let client = client();
        let (_tx, rx) = oneshot::channel::<Result<(), ClientError>>();
        client.close().await;
        assert_matches!(client.wait(rx).await, Err(ClientError::ConnectionClosed));
    }

    #[tokio::test]
    async fn dropped_slot_reads_as_closed() {
        let client = client();
        let (tx, rx) = oneshot::channel::<Result<(), ClientError>>();
        drop(tx);
        assert_matches!(client.wait(rx).await, Err(ClientError::ConnectionClosed));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let client = client();
        assert!(!client.is_closed());
        client.close().await;
        client.close().await;
        assert!(client.is_closed());
    }
}
