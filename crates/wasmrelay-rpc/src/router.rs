//! The single socket reader.
//!
//! Each text frame is decoded once into an [`Inbound`] variant and handed to
//! exactly one consumer. Caller commands are drained before the socket on
//! every turn, so a reply never overtakes the command that registered its
//! slot.

use base64::Engine as _;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BroadcastPhase, ClientError};
use crate::registry::{Command, Registry};
use crate::types::{
    AbciQueryResponse, BroadcastTxResponse, QueryKind, RequestKind, RpcEnvelope, TxEvent,
    error_text,
};

/// Location of the block height in a `NewBlock` event.
const HEIGHT_POINTER: &str = "/data/value/block/header/height";

/// Location of the event list in a `Tx` event.
const EVENTS_POINTER: &str = "/data/value/TxResult/result/events";

/// Decoded payload of a successful query or broadcast.
#[derive(Debug, PartialEq)]
pub enum Reply {
    /// Raw bytes: the query value or the search result JSON.
    Bytes(Vec<u8>),
    /// A decoded broadcast result.
    Broadcast(Box<BroadcastTxResponse>),
}

impl Reply {
    /// The byte payload of a query reply.
    pub fn into_bytes(self) -> Result<Vec<u8>, ClientError> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Broadcast(_) => Err(ClientError::Protocol(
                "expected query bytes, got a broadcast result".into(),
            )),
        }
    }

    /// The decoded result of a broadcast reply.
    pub fn into_broadcast(self) -> Result<BroadcastTxResponse, ClientError> {
        match self {
            Self::Broadcast(resp) => Ok(*resp),
            Self::Bytes(_) => Err(ClientError::Protocol(
                "expected a broadcast result, got query bytes".into(),
            )),
        }
    }
}

/// A classified inbound frame.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// Acknowledgement of a subscribe or unsubscribe request.
    HandshakeAck { job_id: String, error: Option<String> },
    /// New block height for a block subscription.
    NewHeight { job_id: String, height: u64 },
    /// Answer to a query or broadcast.
    Reply {
        id: String,
        outcome: Result<Reply, ClientError>,
    },
    /// Contract events for a subscription.
    Events { job_id: String, events: Vec<TxEvent> },
    /// Anything else, dropped.
    Noise,
}

/// Classify one text frame against the current tables.
pub(crate) fn classify(registry: &Registry, text: &str) -> Inbound {
    let envelope: RpcEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "unparseable frame");
            return Inbound::Noise;
        }
    };
    let Some(id) = envelope.id() else {
        return Inbound::Noise;
    };

    if registry.awaiting_handshake(&id) && envelope.result_at("/data").is_none() {
        return Inbound::HandshakeAck {
            error: envelope.error.as_ref().map(error_text),
            job_id: id,
        };
    }

    if let Some(kind) = registry.pending_kind(&id) {
        return Inbound::Reply {
            outcome: decode_reply(kind, &envelope),
            id,
        };
    }

    if registry.tracks_blocks(&id) {
        return match envelope.result_at(HEIGHT_POINTER).and_then(parse_height) {
            Some(height) => Inbound::NewHeight { job_id: id, height },
            None => Inbound::Noise,
        };
    }

    if registry.is_active(&id) {
        let Some(raw) = envelope.result_at(EVENTS_POINTER) else {
            return Inbound::Noise;
        };
        return match serde_json::from_value::<Vec<TxEvent>>(raw.clone()) {
            Ok(events) => Inbound::Events {
                events: events.into_iter().filter(TxEvent::is_contract_event).collect(),
                job_id: id,
            },
            Err(e) => {
                warn!(job_id = %id, error = %e, "malformed event list");
                Inbound::Noise
            }
        };
    }

    debug!(id = %id, "frame for unknown id");
    Inbound::Noise
}

/// Decode a reply envelope according to the request that produced it.
pub(crate) fn decode_reply(kind: RequestKind, envelope: &RpcEnvelope) -> Result<Reply, ClientError> {
    if let Some(error) = &envelope.error {
        return Err(ClientError::Rpc(error_text(error)));
    }
    let result = envelope
        .result
        .as_ref()
        .ok_or_else(|| ClientError::Protocol(format!("{} reply has no result", kind.method())))?;

    match kind {
        RequestKind::Query(QueryKind::Abci) => {
            let raw = result
                .get("response")
                .ok_or_else(|| ClientError::Protocol("abci_query reply has no response".into()))?;
            let response: AbciQueryResponse = serde_json::from_value(raw.clone())
                .map_err(|e| ClientError::Protocol(format!("abci_query response: {e}")))?;
            if response.code != 0 {
                return Err(ClientError::Abci {
                    code: response.code,
                    log: response.log,
                });
            }
            let bytes = match response.value.as_deref() {
                None | Some("") => Vec::new(),
                Some(encoded) => base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(|e| ClientError::Protocol(format!("abci_query value: {e}")))?,
            };
            Ok(Reply::Bytes(bytes))
        }
        RequestKind::Query(QueryKind::TxSearch) => serde_json::to_vec(result)
            .map(Reply::Bytes)
            .map_err(|e| ClientError::Protocol(e.to_string())),
        RequestKind::Broadcast(_) => {
            let response: BroadcastTxResponse = serde_json::from_value(result.clone())
                .map_err(|e| ClientError::Protocol(format!("broadcast result: {e}")))?;
            check_broadcast(&response)?;
            Ok(Reply::Broadcast(Box::new(response)))
        }
    }
}

/// Fail on the first non-zero status: check, then deliver, then top level.
pub(crate) fn check_broadcast(response: &BroadcastTxResponse) -> Result<(), ClientError> {
    if let Some(check) = response.check_tx.as_ref().filter(|r| r.code != 0) {
        return Err(ClientError::Broadcast {
            phase: BroadcastPhase::Check,
            code: check.code,
            log: check.log.clone(),
        });
    }
    if let Some(deliver) = response.deliver_tx.as_ref().filter(|r| r.code != 0) {
        return Err(ClientError::Broadcast {
            phase: BroadcastPhase::Deliver,
            code: deliver.code,
            log: deliver.log.clone(),
        });
    }
    if response.code != 0 {
        return Err(ClientError::Broadcast {
            phase: BroadcastPhase::Check,
            code: response.code,
            log: response.log.clone(),
        });
    }
    Ok(())
}

/// Heights arrive as decimal strings, occasionally as numbers.
fn parse_height(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

/// Route inbound frames until `link` is cancelled, the node closes, or a
/// read fails.
///
/// Cancels `link` on exit so the connection reads as dead, then drops every
/// pending slot.
pub(crate) async fn run<S>(
    mut source: S,
    mut commands: mpsc::UnboundedReceiver<Command>,
    link: CancellationToken,
) where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let mut registry = Registry::default();

    loop {
        tokio::select! {
            biased;

            () = link.cancelled() => {
                debug!("router shutting down");
                break;
            }
            command = commands.recv() => {
                let Some(command) = command else { break };
                registry.apply(command);
            }
            frame = source.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let inbound = classify(&registry, &text);
                        dispatch(&mut registry, inbound);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "node closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket read failed");
                        break;
                    }
                    None => {
                        info!("websocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    link.cancel();
    registry.release_all();
}

fn dispatch(registry: &mut Registry, inbound: Inbound) {
    match inbound {
        Inbound::HandshakeAck { job_id, error } => registry.complete_handshake(&job_id, error),
        Inbound::NewHeight { job_id, height } => registry.deliver_height(&job_id, height),
        Inbound::Reply { id, outcome } => registry.complete_request(&id, outcome),
        Inbound::Events { job_id, events } => registry.deliver_events(&job_id, events),
        Inbound::Noise => {}
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Subscription, SubscriptionSink};
    use crate::types::{BroadcastMode, RpcRequest, SUBSCRIBE, TxExecResult};
    use assert_matches::assert_matches;
    use serde_json::json;
    use tokio::sync::oneshot;

    fn registry_with_active(job_id: &str) -> (Registry, mpsc::UnboundedReceiver<Vec<TxEvent>>) {
        let mut registry = Registry::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let (accepted, _accepted_rx) = oneshot::channel();
        let (ack, _ack_rx) = oneshot::channel();
        registry.apply(Command::Subscribe {
            subscription: Subscription {
                job_id: job_id.into(),
                request: RpcRequest::new(SUBSCRIBE, vec![], job_id),
                sink: SubscriptionSink::Events(tx),
            },
            accepted,
            ack,
        });
        registry.complete_handshake(job_id, None);
        (registry, rx)
    }

    fn envelope(value: &Value) -> RpcEnvelope {
        serde_json::from_value(value.clone()).unwrap()
    }

    #[test]
    fn events_are_filtered_to_contract_types() {
        let (registry, _rx) = registry_with_active("job-1");
        let frame = json!({
            "jsonrpc": "2.0",
            "id": "job-1",
            "result": {"data": {"value": {"TxResult": {"result": {"events": [
                {"type": "message", "attributes": []},
                {"type": "wasm-new_round", "attributes": [{"key": "round_id", "value": "3"}]},
                {"type": "execute_contract", "attributes": []}
            ]}}}}}
        });
        assert_matches!(
            classify(&registry, &frame.to_string()),
            Inbound::Events { job_id, events } if job_id == "job-1"
                && events.len() == 1
                && events[0].kind == "wasm-new_round"
        );
    }

    #[test]
    fn handshake_echo_without_events_is_noise() {
        let (registry, _rx) = registry_with_active("job-1");
        let frame = json!({"jsonrpc": "2.0", "id": "job-1", "result": {}});
        assert_matches!(classify(&registry, &frame.to_string()), Inbound::Noise);
    }

    #[test]
    fn event_racing_unsubscribe_is_not_an_ack() {
        let (mut registry, _rx) = registry_with_active("job-1");
        let (accepted, _accepted_rx) = oneshot::channel();
        let (ack, _ack_rx) = oneshot::channel();
        registry.apply(Command::Unsubscribe {
            job_id: "job-1".into(),
            accepted,
            ack,
        });
        let event = json!({
            "id": "job-1",
            "result": {"data": {"value": {"TxResult": {"result": {"events": []}}}}}
        });
        assert_matches!(classify(&registry, &event.to_string()), Inbound::Events { .. });

        let ack = json!({"id": "job-1", "result": {}});
        assert_matches!(
            classify(&registry, &ack.to_string()),
            Inbound::HandshakeAck { error: None, .. }
        );
    }

    #[test]
    fn handshake_error_is_carried() {
        let mut registry = Registry::default();
        let (accepted, _accepted_rx) = oneshot::channel();
        let (ack, _ack_rx) = oneshot::channel();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.apply(Command::Subscribe {
            subscription: Subscription {
                job_id: "job-2".into(),
                request: RpcRequest::new(SUBSCRIBE, vec![], "job-2"),
                sink: SubscriptionSink::Events(tx),
            },
            accepted,
            ack,
        });
        let frame = json!({"id": "job-2", "error": {"code": -32603, "message": "Internal error", "data": "already subscribed"}});
        assert_matches!(
            classify(&registry, &frame.to_string()),
            Inbound::HandshakeAck { error: Some(e), .. } if e == "Internal error: already subscribed"
        );
    }

    #[test]
    fn unknown_and_malformed_frames_are_noise() {
        let registry = Registry::default();
        assert_matches!(classify(&registry, "not json"), Inbound::Noise);
        assert_matches!(classify(&registry, r#"{"id":"nobody","result":{}}"#), Inbound::Noise);
        assert_matches!(classify(&registry, r#"{"result":{}}"#), Inbound::Noise);
    }

    #[test]
    fn abci_reply_decodes_base64_value() {
        let env = envelope(&json!({
            "id": "abci_query#1",
            "result": {"response": {"code": 0, "log": "", "value": "eyJhbnN3ZXIiOjQyfQ=="}}
        }));
        let reply = decode_reply(RequestKind::Query(QueryKind::Abci), &env).unwrap();
        assert_eq!(reply.into_bytes().unwrap(), br#"{"answer":42}"#.to_vec());
    }

    #[test]
    fn abci_nonzero_code_carries_log() {
        let env = envelope(&json!({
            "id": "abci_query#1",
            "result": {"response": {"code": 18, "log": "contract: not found", "codespace": "wasm"}}
        }));
        assert_matches!(
            decode_reply(RequestKind::Query(QueryKind::Abci), &env),
            Err(ClientError::Abci { code: 18, log }) if log == "contract: not found"
        );
    }

    #[test]
    fn explicit_error_field_wins() {
        let env = envelope(&json!({
            "id": "tx_search#2",
            "error": {"code": -32602, "message": "Invalid params"}
        }));
        assert_matches!(
            decode_reply(RequestKind::Query(QueryKind::TxSearch), &env),
            Err(ClientError::Rpc(msg)) if msg == "Invalid params"
        );
    }

    #[test]
    fn tx_search_returns_raw_result() {
        let env = envelope(&json!({"id": "tx_search#2", "result": {"txs": [], "total_count": "0"}}));
        let bytes = decode_reply(RequestKind::Query(QueryKind::TxSearch), &env)
            .unwrap()
            .into_bytes()
            .unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["total_count"], "0");
    }

    #[test]
    fn missing_result_is_protocol_error() {
        let env = envelope(&json!({"id": "tx_search#2"}));
        assert_matches!(
            decode_reply(RequestKind::Query(QueryKind::TxSearch), &env),
            Err(ClientError::Protocol(_))
        );
    }

    #[test]
    fn broadcast_failure_order() {
        let both = BroadcastTxResponse {
            check_tx: Some(TxExecResult {
                code: 2,
                log: "bad signature".into(),
                ..TxExecResult::default()
            }),
            deliver_tx: Some(TxExecResult {
                code: 5,
                log: "insufficient funds".into(),
                ..TxExecResult::default()
            }),
            ..BroadcastTxResponse::default()
        };
        assert_matches!(
            check_broadcast(&both),
            Err(ClientError::Broadcast { phase: BroadcastPhase::Check, code: 2, .. })
        );

        let deliver_only = BroadcastTxResponse {
            check_tx: Some(TxExecResult::default()),
            deliver_tx: Some(TxExecResult {
                code: 5,
                log: "insufficient funds".into(),
                ..TxExecResult::default()
            }),
            ..BroadcastTxResponse::default()
        };
        assert_matches!(
            check_broadcast(&deliver_only),
            Err(ClientError::Broadcast { phase: BroadcastPhase::Deliver, code: 5, log }) if log == "insufficient funds"
        );

        let sync = BroadcastTxResponse {
            code: 19,
            log: "tx already in mempool".into(),
            ..BroadcastTxResponse::default()
        };
        assert_matches!(
            check_broadcast(&sync),
            Err(ClientError::Broadcast { phase: BroadcastPhase::Check, code: 19, .. })
        );

        assert!(check_broadcast(&BroadcastTxResponse::default()).is_ok());
    }

    #[test]
    fn broadcast_reply_is_boxed_result() {
        let env = envelope(&json!({
            "id": "broadcast_tx_sync#3",
            "result": {"code": 0, "data": "", "log": "[]", "codespace": "", "hash": "DEADBEEF"}
        }));
        let reply = decode_reply(RequestKind::Broadcast(BroadcastMode::Sync), &env).unwrap();
        assert_eq!(reply.into_broadcast().unwrap().hash, "DEADBEEF");
    }

    #[test]
    fn height_accepts_string_or_number() {
        assert_eq!(parse_height(&json!("1234")), Some(1234));
        assert_eq!(parse_height(&json!(99)), Some(99));
        assert_eq!(parse_height(&json!("tall")), None);
        assert_eq!(parse_height(&json!(null)), None);
    }

    #[tokio::test]
    async fn router_releases_waiters_when_stream_ends() {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (reply, reply_rx) = oneshot::channel();
        commands_tx
            .send(Command::Await {
                id: "abci_query#1".into(),
                kind: RequestKind::Query(QueryKind::Abci),
                reply,
            })
            .unwrap();

        let source = futures::stream::pending::<Result<Message, tungstenite::Error>>();
        let shutdown = CancellationToken::new();
        let link = shutdown.child_token();
        let task = tokio::spawn(run(source, commands_rx, link.clone()));

        tokio::task::yield_now().await;
        shutdown.cancel();
        task.await.unwrap();

        assert!(link.is_cancelled());
        assert!(reply_rx.await.is_err());
    }

    #[tokio::test]
    async fn router_routes_reply_registered_before_frame() {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (reply, reply_rx) = oneshot::channel();
        commands_tx
            .send(Command::Await {
                id: "tx_search#7".into(),
                kind: RequestKind::Query(QueryKind::TxSearch),
                reply,
            })
            .unwrap();

        let frame = json!({"id": "tx_search#7", "result": {"total_count": "1"}}).to_string();
        let source = futures::stream::iter(vec![Ok(Message::Text(frame.into()))]);
        let link = CancellationToken::new();
        run(source, commands_rx, link.clone()).await;
        assert!(link.is_cancelled());

        let bytes = reply_rx.await.unwrap().unwrap().into_bytes().unwrap();
        assert!(String::from_utf8(bytes).unwrap().contains("total_count"));
    }
}
