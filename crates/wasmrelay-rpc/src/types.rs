//! Wire types for the Tendermint JSON-RPC dialect.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version sent on every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Subscribe method name.
pub const SUBSCRIBE: &str = "subscribe";

/// Unsubscribe method name.
pub const UNSUBSCRIBE: &str = "unsubscribe";

/// Event type prefix emitted by contract executions.
pub const CONTRACT_EVENT_PREFIX: &str = "wasm-";

/// Outbound request frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Positional parameters.
    pub params: Vec<Value>,
    /// Correlation id echoed back by the node.
    pub id: String,
}

impl RpcRequest {
    /// Build a request frame.
    pub fn new(method: impl Into<String>, params: Vec<Value>, id: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: id.into(),
        }
    }

    /// Same frame with a different method.
    #[must_use]
    pub fn with_method(&self, method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..self.clone()
        }
    }
}

/// State query methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// `abci_query`: contract state.
    Abci,
    /// `tx_search`: transaction search.
    TxSearch,
}

impl QueryKind {
    /// RPC method name.
    pub const fn method(self) -> &'static str {
        match self {
            Self::Abci => "abci_query",
            Self::TxSearch => "tx_search",
        }
    }

    /// Parameters the caller must supply.
    pub const fn min_params(self) -> usize {
        match self {
            Self::Abci => 2,
            Self::TxSearch => 1,
        }
    }

    /// Trailing parameters appended when omitted, in position order.
    pub fn default_params(self) -> Vec<Value> {
        match self {
            // height, prove
            Self::Abci => vec![Value::from("0"), Value::from(false)],
            // prove, page, per_page, order_by
            Self::TxSearch => vec![
                Value::from(false),
                Value::from("1"),
                Value::from("30"),
                Value::from("desc"),
            ],
        }
    }
}

/// Broadcast flavours, each a distinct RPC method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BroadcastMode {
    /// Returns with the `CheckTx` result, does not wait for inclusion.
    #[default]
    Sync,
    /// Returns right away with no check result.
    Async,
    /// Returns with both `CheckTx` and `DeliverTx` results.
    Commit,
}

impl BroadcastMode {
    /// RPC method name.
    pub const fn method(self) -> &'static str {
        match self {
            Self::Sync => "broadcast_tx_sync",
            Self::Async => "broadcast_tx_async",
            Self::Commit => "broadcast_tx_commit",
        }
    }
}

impl fmt::Display for BroadcastMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

impl FromStr for BroadcastMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sync" | "broadcast_tx_sync" => Ok(Self::Sync),
            "async" | "broadcast_tx_async" => Ok(Self::Async),
            "commit" | "block" | "broadcast_tx_commit" => Ok(Self::Commit),
            other => Err(format!("unknown broadcast mode '{other}'")),
        }
    }
}

/// What a pending reply slot expects, so the router can decode it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// A state query.
    Query(QueryKind),
    /// A transaction broadcast.
    Broadcast(BroadcastMode),
}

impl RequestKind {
    /// RPC method name.
    pub const fn method(self) -> &'static str {
        match self {
            Self::Query(kind) => kind.method(),
            Self::Broadcast(mode) => mode.method(),
        }
    }
}

/// One key/value attribute of a transaction event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventAttribute {
    /// Attribute key.
    pub key: String,
    /// Attribute value.
    pub value: String,
    /// Whether the node indexes this attribute.
    pub index: bool,
}

/// A transaction event as emitted by the chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEvent {
    /// Event type, e.g. `wasm-new_transmission`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event attributes.
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

impl TxEvent {
    /// Whether the event was emitted by a contract execution.
    pub fn is_contract_event(&self) -> bool {
        self.kind.starts_with(CONTRACT_EVENT_PREFIX)
    }

    /// First value for `key`, if present.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

/// Execution result of one phase of a committed transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxExecResult {
    /// Status code, zero on success.
    pub code: u32,
    /// Returned data.
    pub data: Option<String>,
    /// Log text.
    pub log: String,
    /// Error namespace.
    pub codespace: String,
    /// Events emitted in this phase.
    pub events: Vec<TxEvent>,
}

/// Result of a transaction broadcast.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastTxResponse {
    /// Status code (sync/async), zero on success.
    pub code: u32,
    /// Returned data.
    pub data: Option<String>,
    /// Log text.
    pub log: String,
    /// Error namespace.
    pub codespace: String,
    /// Transaction hash.
    pub hash: String,
    /// `CheckTx` outcome (commit only).
    pub check_tx: Option<TxExecResult>,
    /// `DeliverTx` outcome (commit only).
    pub deliver_tx: Option<TxExecResult>,
    /// Inclusion height (commit only).
    pub height: Option<String>,
}

/// `result.response` of an `abci_query` reply.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AbciQueryResponse {
    pub code: u32,
    pub log: String,
    /// Base64 payload.
    pub value: Option<String>,
}

/// Inbound frame before classification.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RpcEnvelope {
    pub id: Value,
    pub result: Option<Value>,
    pub error: Option<Value>,
}

impl RpcEnvelope {
    /// The correlation id as a string, if the frame has one.
    pub fn id(&self) -> Option<String> {
        match &self.id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// A nested value under `result`.
    pub fn result_at(&self, pointer: &str) -> Option<&Value> {
        self.result.as_ref().and_then(|r| r.pointer(pointer))
    }
}

/// Human-readable text of a JSON-RPC `error` member.
pub(crate) fn error_text(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            let message = map.get("message").and_then(Value::as_str);
            let data = map.get("data").and_then(Value::as_str);
            match (message, data) {
                (Some(m), Some(d)) if !d.is_empty() => format!("{m}: {d}"),
                (Some(m), _) => m.to_string(),
                _ => error.to_string(),
            }
        }
        other => other.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
