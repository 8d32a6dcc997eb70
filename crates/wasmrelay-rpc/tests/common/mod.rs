//! In-process mock Tendermint node.

#![allow(dead_code)]

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// A running mock node.
pub struct MockNode {
    /// `ws://` URL of the node.
    pub url: String,
    /// Every request frame the node received, in order.
    pub received: mpsc::UnboundedReceiver<Value>,
    /// Frames to push to the client unprompted.
    pub push: mpsc::UnboundedSender<Value>,
}

impl MockNode {
    /// Serve one client. `handler` maps each request to the frames sent back.
    pub async fn spawn<F>(mut handler: F) -> Self
    where
        F: FnMut(&Value) -> Vec<Value> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (push, mut push_rx) = mpsc::unbounded_channel::<Value>();

        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            loop {
                tokio::select! {
                    frame = ws.next() => {
                        let Some(Ok(Message::Text(text))) = frame else { break };
                        let request: Value = serde_json::from_str(&text).unwrap();
                        let replies = handler(&request);
                        let _ = received_tx.send(request);
                        for reply in replies {
                            if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(frame) = push_rx.recv() => {
                        if ws.send(Message::Text(frame.to_string().into())).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Self {
            url: format!("ws://{addr}/websocket"),
            received,
            push,
        }
    }

    /// Next request the node received.
    pub async fn next_request(&mut self) -> Value {
        tokio::time::timeout(TIMEOUT, self.received.recv())
            .await
            .unwrap()
            .unwrap()
    }
}

/// Acknowledge subscribe/unsubscribe requests; defer everything else to `other`.
pub fn acking<F>(mut other: F) -> impl FnMut(&Value) -> Vec<Value> + Send + 'static
where
    F: FnMut(&Value) -> Vec<Value> + Send + 'static,
{
    move |request| match request["method"].as_str() {
        Some("subscribe" | "unsubscribe") => vec![ack(request)],
        _ => other(request),
    }
}

/// Empty-result acknowledgement for `request`.
pub fn ack(request: &Value) -> Value {
    json!({"jsonrpc": "2.0", "id": request["id"], "result": {}})
}

/// Successful reply carrying `result`.
pub fn reply(request: &Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": request["id"], "result": result})
}

/// Error reply.
pub fn error_reply(request: &Value, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": request["id"],
        "error": {"code": -32603, "message": message, "data": ""}
    })
}

/// A `Tx` event frame for subscription `job_id`.
pub fn tx_event(job_id: &str, events: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": job_id,
        "result": {
            "query": "tm.event='Tx'",
            "data": {"type": "tendermint/event/Tx", "value": {"TxResult": {
                "height": "10",
                "result": {"events": events}
            }}}
        }
    })
}

/// A `NewBlock` event frame for the head tracker.
pub fn new_block(height: u64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": "head-tracker",
        "result": {
            "query": "tm.event='NewBlock'",
            "data": {"type": "tendermint/event/NewBlock", "value": {"block": {
                "header": {"chain_id": "localwasm", "height": height.to_string()}
            }}}
        }
    })
}
