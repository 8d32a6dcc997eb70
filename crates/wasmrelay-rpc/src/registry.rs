//! Subscription and pending-reply tables owned by the router task.
//!
//! Callers never touch these tables directly. They send a [`Command`] to the
//! router, which applies it between socket reads, so no lock guards the
//! tables.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::router::Reply;
use crate::types::{RequestKind, RpcRequest, TxEvent, UNSUBSCRIBE};

/// One-shot slot carrying a handshake outcome.
pub(crate) type AckTx = oneshot::Sender<Result<(), ClientError>>;

/// One-shot slot carrying a query or broadcast reply.
pub(crate) type ReplyTx = oneshot::Sender<Result<Reply, ClientError>>;

/// Where the router pushes data for a subscription.
#[derive(Debug)]
pub(crate) enum SubscriptionSink {
    /// Filtered contract events.
    Events(mpsc::UnboundedSender<Vec<TxEvent>>),
    /// New block heights (head tracker).
    Blocks(Arc<watch::Sender<u64>>),
}

/// An event subscription.
#[derive(Debug)]
pub(crate) struct Subscription {
    pub job_id: String,
    /// Stored to build the matching unsubscribe request.
    pub request: RpcRequest,
    pub sink: SubscriptionSink,
}

/// Requests sent from callers to the router task.
#[derive(Debug)]
pub(crate) enum Command {
    /// Reserve `subscription.job_id` for a subscribe handshake.
    ///
    /// `accepted` answers at once (duplicate check); `ack` answers when the
    /// node acknowledges the subscribe frame.
    Subscribe {
        subscription: Subscription,
        accepted: oneshot::Sender<Result<(), ClientError>>,
        ack: AckTx,
    },
    /// Begin an unsubscribe handshake. `accepted` carries the frame to write.
    Unsubscribe {
        job_id: String,
        accepted: oneshot::Sender<Result<RpcRequest, ClientError>>,
        ack: AckTx,
    },
    /// Register a reply slot for request `id`.
    Await {
        id: String,
        kind: RequestKind,
        reply: ReplyTx,
    },
    /// Forget a slot whose caller stopped waiting.
    Abandon { id: String },
}

/// Handshake waiting for the node's acknowledgement.
#[derive(Debug)]
enum Handshake {
    Subscribe { subscription: Subscription, ack: AckTx },
    Unsubscribe { ack: AckTx },
}

/// Reply slot for one in-flight query or broadcast.
#[derive(Debug)]
struct PendingReply {
    kind: RequestKind,
    reply: ReplyTx,
}

/// Tables mutated only by the router task.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    active: HashMap<String, Subscription>,
    handshakes: HashMap<String, Handshake>,
    requests: HashMap<String, PendingReply>,
}

impl Registry {
    /// Apply one caller command.
    pub fn apply(&mut self, command: Command) {
        match command {
            Command::Subscribe {
                subscription,
                accepted,
                ack,
            } => {
                let job_id = subscription.job_id.clone();
                if self.active.contains_key(&job_id) || self.handshakes.contains_key(&job_id) {
                    let _ = accepted.send(Err(ClientError::DuplicateSubscription { job_id }));
                    return;
                }
                let _ = self
                    .handshakes
                    .insert(job_id, Handshake::Subscribe { subscription, ack });
                let _ = accepted.send(Ok(()));
            }
            Command::Unsubscribe {
                job_id,
                accepted,
                ack,
            } => {
                if self.handshakes.contains_key(&job_id) {
                    let _ = accepted.send(Err(ClientError::Handshake {
                        job_id,
                        message: "another handshake is in progress".into(),
                    }));
                    return;
                }
                let Some(subscription) = self.active.get(&job_id) else {
                    let _ = accepted.send(Err(ClientError::UnknownSubscription { job_id }));
                    return;
                };
                let request = subscription.request.with_method(UNSUBSCRIBE);
                let _ = self.handshakes.insert(job_id, Handshake::Unsubscribe { ack });
                let _ = accepted.send(Ok(request));
            }
            Command::Await { id, kind, reply } => {
                let _ = self.requests.insert(id, PendingReply { kind, reply });
            }
            Command::Abandon { id } => {
                let _ = self.requests.remove(&id);
                let _ = self.handshakes.remove(&id);
            }
        }
    }

    /// Whether a handshake is waiting under `id`.
    pub fn awaiting_handshake(&self, id: &str) -> bool {
        self.handshakes.contains_key(id)
    }

    /// Request kind of the reply slot registered under `id`.
    pub fn pending_kind(&self, id: &str) -> Option<RequestKind> {
        self.requests.get(id).map(|p| p.kind)
    }

    /// Whether `id` names an active subscription.
    pub fn is_active(&self, id: &str) -> bool {
        self.active.contains_key(id)
    }

    /// Whether the active subscription `id` receives block heights.
    pub fn tracks_blocks(&self, id: &str) -> bool {
        matches!(
            self.active.get(id),
            Some(Subscription {
                sink: SubscriptionSink::Blocks(_),
                ..
            })
        )
    }

    /// Complete the handshake under `job_id`.
    pub fn complete_handshake(&mut self, job_id: &str, error: Option<String>) {
        let Some(handshake) = self.handshakes.remove(job_id) else {
            return;
        };
        let outcome = match error {
            Some(message) => Err(ClientError::Handshake {
                job_id: job_id.to_string(),
                message,
            }),
            None => Ok(()),
        };
        match handshake {
            Handshake::Subscribe { subscription, ack } => {
                if outcome.is_ok() {
                    info!(job_id, "subscription created");
                    let _ = self.active.insert(job_id.to_string(), subscription);
                }
                let _ = ack.send(outcome);
            }
            Handshake::Unsubscribe { ack } => {
                if outcome.is_ok() {
                    info!(job_id, "unsubscribe successful");
                    let _ = self.active.remove(job_id);
                }
                let _ = ack.send(outcome);
            }
        }
    }

    /// Hand a decoded reply to the caller waiting on `id`.
    pub fn complete_request(&mut self, id: &str, outcome: Result<Reply, ClientError>) {
        match self.requests.remove(id) {
            Some(pending) => {
                if pending.reply.send(outcome).is_err() {
                    debug!(request_id = id, "caller stopped waiting, reply dropped");
                }
            }
            None => debug!(request_id = id, "no caller waiting for reply"),
        }
    }

    /// Raise the tracked height for block subscription `job_id`.
    pub fn deliver_height(&self, job_id: &str, height: u64) {
        if let Some(Subscription {
            sink: SubscriptionSink::Blocks(heights),
            ..
        }) = self.active.get(job_id)
        {
            let raised = heights.send_if_modified(|current| {
                if height > *current {
                    *current = height;
                    true
                } else {
                    false
                }
            });
            if raised {
                debug!(job_id, height, "block height");
            }
        }
    }

    /// Push filtered events to subscription `job_id`.
    pub fn deliver_events(&self, job_id: &str, events: Vec<TxEvent>) {
        if let Some(Subscription {
            sink: SubscriptionSink::Events(tx),
            ..
        }) = self.active.get(job_id)
        {
            if tx.send(events).is_err() {
                warn!(job_id, "event receiver dropped, skipping delivery");
            }
        }
    }

    /// Drop every table entry; waiting callers see their slot close.
    pub fn release_all(&mut self) {
        let waiting = self.handshakes.len() + self.requests.len();
        if waiting > 0 {
            debug!(waiting, "releasing blocked callers");
        }
        self.handshakes.clear();
        self.requests.clear();
        self.active.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
