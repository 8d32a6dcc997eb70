//! Subscribe and unsubscribe handshakes.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::client::TendermintClient;
use crate::error::ClientError;
use crate::head_tracker::HEAD_TRACKER_ID;
use crate::registry::{Command, Subscription, SubscriptionSink};
use crate::types::{RpcRequest, SUBSCRIBE, TxEvent};

/// Event filter matching executions of one contract.
pub fn contract_filter(address: &str) -> String {
    format!("tm.event='Tx' AND execute_contract.contract_address='{address}'")
}

impl TendermintClient {
    /// Subscribe `job_id` to events matching `filters`.
    ///
    /// Each filtered contract-event list is pushed to `sink`. Fails without
    /// side effects if `job_id` is already subscribed, and with
    /// [`ClientError::Handshake`] if the node rejects the request.
    pub async fn subscribe(
        &self,
        job_id: &str,
        filters: &[String],
        sink: mpsc::UnboundedSender<Vec<TxEvent>>,
    ) -> Result<(), ClientError> {
        if job_id == HEAD_TRACKER_ID {
            return Err(ClientError::ReservedJobId {
                job_id: job_id.to_string(),
            });
        }
        self.subscribe_with_sink(job_id, filters, SubscriptionSink::Events(sink))
            .await
    }

    /// Subscribe `job_id` to executions of `address` and return the event stream.
    pub async fn subscribe_contract(
        &self,
        job_id: &str,
        address: &str,
    ) -> Result<mpsc::UnboundedReceiver<Vec<TxEvent>>, ClientError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(job_id, &[contract_filter(address)], tx).await?;
        info!(job_id, address, "contract subscription created");
        Ok(rx)
    }

    /// Remove subscription `job_id` after the node acknowledges it.
    pub async fn unsubscribe(&self, job_id: &str) -> Result<(), ClientError> {
        let router = self.connection.ensure_connected().await?;
        let (accepted, accepted_rx) = oneshot::channel();
        let (ack, ack_rx) = oneshot::channel();
        router.send(Command::Unsubscribe {
            job_id: job_id.to_string(),
            accepted,
            ack,
        })?;
        let request = self.wait(accepted_rx).await?;

        let slot = router.guard(job_id);
        self.connection.write(&request).await?;
        let outcome = self.wait(ack_rx).await;
        slot.disarm();
        outcome
    }

    pub(crate) async fn subscribe_with_sink(
        &self,
        job_id: &str,
        filters: &[String],
        sink: SubscriptionSink,
    ) -> Result<(), ClientError> {
        let router = self.connection.ensure_connected().await?;
        let params = filters.iter().cloned().map(Value::String).collect();
        let request = RpcRequest::new(SUBSCRIBE, params, job_id);

        let (accepted, accepted_rx) = oneshot::channel();
        let (ack, ack_rx) = oneshot::channel();
        router.send(Command::Subscribe {
            subscription: Subscription {
                job_id: job_id.to_string(),
                request: request.clone(),
                sink,
            },
            accepted,
            ack,
        })?;
        self.wait(accepted_rx).await?;

        let slot = router.guard(job_id);
        self.connection.write(&request).await?;
        let outcome = self.wait(ack_rx).await;
        slot.disarm();
        outcome
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use assert_matches::assert_matches;

    #[test]
    fn contract_filter_shape() {
        assert_eq!(
            contract_filter("wasm1abc"),
            "tm.event='Tx' AND execute_contract.contract_address='wasm1abc'"
        );
    }

    #[tokio::test]
    async fn reserved_job_id_is_rejected_before_dialing() {
        let client = TendermintClient::new(ClientConfig::new("ws://127.0.0.1:1/websocket"));
        let (tx, _rx) = mpsc::unbounded_channel();
        assert_matches!(
            client.subscribe(HEAD_TRACKER_ID, &[], tx).await,
            Err(ClientError::ReservedJobId { .. })
        );
    }
}
