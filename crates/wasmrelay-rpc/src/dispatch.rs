//! State queries, transaction searches and broadcasts.

use base64::Engine as _;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tracing::debug;

use crate::client::TendermintClient;
use crate::error::ClientError;
use crate::registry::Command;
use crate::router::Reply;
use crate::types::{BroadcastMode, BroadcastTxResponse, QueryKind, RequestKind, RpcRequest};

/// `abci_query` path for smart contract state.
pub const CONTRACT_STORE_PATH: &str = "custom/wasm/contractStore";

/// Check the required parameters and append defaults for the rest.
pub fn prepare_params(kind: QueryKind, mut params: Vec<Value>) -> Result<Vec<Value>, ClientError> {
    let min = kind.min_params();
    if params.len() < min {
        return Err(ClientError::MissingParams {
            method: kind.method(),
            min,
            got: params.len(),
        });
    }
    let defaults = kind.default_params();
    let supplied_defaults = params.len() - min;
    if supplied_defaults < defaults.len() {
        params.extend(defaults.into_iter().skip(supplied_defaults));
    }
    Ok(params)
}

/// Hex-encoded canonical JSON (object keys sorted).
pub fn encode_query_payload<T: Serialize + ?Sized>(payload: &T) -> Result<String, ClientError> {
    let value = serde_json::to_value(payload).map_err(|e| ClientError::Encode(e.to_string()))?;
    let bytes = serde_json::to_vec(&value).map_err(|e| ClientError::Encode(e.to_string()))?;
    Ok(hex::encode(bytes))
}

impl TendermintClient {
    /// Raw `abci_query`: `params` is `[path, hex data, height?, prove?]`.
    ///
    /// Returns the decoded response value.
    pub async fn query(&self, params: Vec<Value>) -> Result<Vec<u8>, ClientError> {
        let params = prepare_params(QueryKind::Abci, params)?;
        self.round_trip(RequestKind::Query(QueryKind::Abci), params)
            .await?
            .into_bytes()
    }

    /// Query contract state with `msg`; returns the contract's raw reply.
    pub async fn query_contract_state<T: Serialize + ?Sized>(
        &self,
        address: &str,
        msg: &T,
    ) -> Result<Vec<u8>, ClientError> {
        let msg = serde_json::to_value(msg).map_err(|e| ClientError::Encode(e.to_string()))?;
        let data = encode_query_payload(&json!({
            "contract_address": address,
            "msg": msg,
        }))?;
        self.query(vec![Value::from(CONTRACT_STORE_PATH), Value::from(data)])
            .await
    }

    /// `tx_search`: `params` is `[query, prove?, page?, per_page?, order_by?]`.
    ///
    /// Returns the raw result JSON.
    pub async fn search_txs(&self, params: Vec<Value>) -> Result<Vec<u8>, ClientError> {
        let params = prepare_params(QueryKind::TxSearch, params)?;
        self.round_trip(RequestKind::Query(QueryKind::TxSearch), params)
            .await?
            .into_bytes()
    }

    /// Broadcast a signed transaction.
    ///
    /// [`BroadcastMode::Commit`] also fails when block inclusion fails.
    pub async fn broadcast(
        &self,
        tx: &[u8],
        mode: BroadcastMode,
    ) -> Result<BroadcastTxResponse, ClientError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(tx);
        self.round_trip(RequestKind::Broadcast(mode), vec![Value::from(encoded)])
            .await?
            .into_broadcast()
    }

    /// Register a reply slot, write the request, wait for the reply.
    async fn round_trip(&self, kind: RequestKind, params: Vec<Value>) -> Result<Reply, ClientError> {
        let router = self.connection.ensure_connected().await?;
        let id = self.next_request_id(kind.method());
        let request = RpcRequest::new(kind.method(), params, id.clone());

        let (reply, reply_rx) = oneshot::channel();
        router.send(Command::Await {
            id: id.clone(),
            kind,
            reply,
        })?;
        let slot = router.guard(id);
        self.connection.write(&request).await?;
        debug!(request_id = %request.id, "awaiting reply");
        let outcome = self.wait(reply_rx).await;
        slot.disarm();
        outcome
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
