//! Client error types.

use std::fmt;

use thiserror::Error;

/// Which stage of transaction processing rejected a broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BroadcastPhase {
    /// Mempool admission (`CheckTx`).
    Check,
    /// Block inclusion (`DeliverTx`).
    Deliver,
}

impl fmt::Display for BroadcastPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Check => f.write_str("check"),
            Self::Deliver => f.write_str("deliver"),
        }
    }
}

/// Errors surfaced by [`TendermintClient`](crate::TendermintClient) operations.
///
/// Every error is reported to the caller that triggered the operation.
/// Nothing is retried internally.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Dialing the node failed.
    #[error("failed to connect to {url}: {reason}")]
    Connect {
        /// Endpoint that was dialed.
        url: String,
        /// Transport error.
        reason: String,
    },

    /// Writing a request frame failed.
    #[error("websocket write failed: {0}")]
    Write(String),

    /// The client was closed, or the connection ended while waiting.
    #[error("connection closed")]
    ConnectionClosed,

    /// The connection dropped earlier; construct a new client.
    #[error("connection lost, construct a new client to reconnect")]
    ConnectionLost,

    /// A request could not be serialized.
    #[error("failed to encode request: {0}")]
    Encode(String),

    /// A response could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The node answered with an explicit JSON-RPC error.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// A state query returned a non-zero code.
    #[error("query error (code {code}): {log}")]
    Abci {
        /// Application status code.
        code: u32,
        /// Application log text.
        log: String,
    },

    /// A broadcast transaction was rejected.
    #[error("broadcast error during {phase} (code {code}): {log}")]
    Broadcast {
        /// Stage that rejected the transaction.
        phase: BroadcastPhase,
        /// Application status code.
        code: u32,
        /// Application log text.
        log: String,
    },

    /// Fewer parameters than the method requires.
    #[error("not enough query parameters for {method}: need at least {min}, got {got}")]
    MissingParams {
        /// RPC method name.
        method: &'static str,
        /// Required minimum.
        min: usize,
        /// Supplied count.
        got: usize,
    },

    /// A subscription with this job id is already active or being set up.
    #[error("[{job_id}] subscription already exists")]
    DuplicateSubscription {
        /// Conflicting job id.
        job_id: String,
    },

    /// No subscription is registered under this job id.
    #[error("[{job_id}] cannot unsubscribe, job does not exist")]
    UnknownSubscription {
        /// Missing job id.
        job_id: String,
    },

    /// The job id is reserved for the built-in head tracker.
    #[error("[{job_id}] job id is reserved")]
    ReservedJobId {
        /// Reserved job id.
        job_id: String,
    },

    /// The node rejected a subscribe or unsubscribe handshake.
    #[error("[{job_id}] subscription handshake failed: {message}")]
    Handshake {
        /// Job id of the handshake.
        job_id: String,
        /// Error text from the node.
        message: String,
    },
}

impl ClientError {
    /// Whether the error means the connection is unusable.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Write(_) | Self::ConnectionClosed | Self::ConnectionLost
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
