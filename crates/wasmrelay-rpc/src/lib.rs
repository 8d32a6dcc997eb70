//! # wasmrelay-rpc
//!
//! Multiplexed Tendermint JSON-RPC client over a single WebSocket.
//!
//! - **Connection**: dialed lazily, writes serialized behind one lock, no reconnect
//! - **Router**: the only socket reader; classifies each frame once and hands
//!   it to exactly one waiter
//! - **Subscriptions**: [`TendermintClient::subscribe`] /
//!   [`TendermintClient::unsubscribe`] handshakes, contract events filtered to
//!   `wasm-` types
//! - **Head tracker**: built-in `NewBlock` subscription keeping the latest height
//! - **Queries and broadcasts**: `abci_query`, `tx_search` and the three
//!   `broadcast_tx_*` methods, each call correlated by its own request id
//!
//! [`TendermintClient::close`] releases every blocked caller with
//! [`ClientError::ConnectionClosed`].

#![deny(unsafe_code)]

mod client;
mod connection;
mod dispatch;
mod head_tracker;
mod registry;
mod router;
mod subscription;

pub mod error;
pub mod types;

pub use client::{ClientConfig, TendermintClient};
pub use dispatch::{CONTRACT_STORE_PATH, encode_query_payload, prepare_params};
pub use error::{BroadcastPhase, ClientError};
pub use head_tracker::{HEAD_TRACKER_ID, HeadTracker, NEW_BLOCK_FILTER};
pub use subscription::contract_filter;
pub use types::{
    BroadcastMode, BroadcastTxResponse, EventAttribute, QueryKind, RequestKind, RpcRequest,
    TxEvent, TxExecResult,
};
