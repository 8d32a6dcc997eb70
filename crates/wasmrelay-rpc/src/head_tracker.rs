//! Built-in new-block subscription tracking the chain height.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::client::TendermintClient;
use crate::error::ClientError;
use crate::registry::SubscriptionSink;

/// Job id reserved for the head tracker.
pub const HEAD_TRACKER_ID: &str = "head-tracker";

/// Filter for new-block events.
pub const NEW_BLOCK_FILTER: &str = "tm.event='NewBlock'";

/// Read side of the tracked chain height. Zero until the first block.
///
/// Waits end with [`ClientError::ConnectionClosed`] once the client closes
/// or its connection drops.
#[derive(Clone, Debug)]
pub struct HeadTracker {
    heights: watch::Receiver<u64>,
    link: CancellationToken,
}

impl HeadTracker {
    /// Latest observed height.
    pub fn latest(&self) -> u64 {
        *self.heights.borrow()
    }

    /// Wait for the next height change.
    pub async fn changed(&mut self) -> Result<u64, ClientError> {
        tokio::select! {
            biased;

            () = self.link.cancelled() => return Err(ClientError::ConnectionClosed),
            changed = self.heights.changed() => {
                changed.map_err(|_| ClientError::ConnectionClosed)?;
            }
        }
        Ok(*self.heights.borrow_and_update())
    }

    /// Wait until the height reaches at least `height`.
    pub async fn wait_for_height(&mut self, height: u64) -> Result<u64, ClientError> {
        tokio::select! {
            biased;

            () = self.link.cancelled() => Err(ClientError::ConnectionClosed),
            reached = self.heights.wait_for(|h| *h >= height) => reached
                .map(|h| *h)
                .map_err(|_| ClientError::ConnectionClosed),
        }
    }
}

impl TendermintClient {
    /// Subscribe to new blocks under [`HEAD_TRACKER_ID`].
    ///
    /// Starting an already running tracker is a no-op.
    pub async fn start_head_tracker(&self) -> Result<(), ClientError> {
        if self.head_tracker.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let sink = SubscriptionSink::Blocks(Arc::clone(&self.heights));
        if let Err(e) = self
            .subscribe_with_sink(HEAD_TRACKER_ID, &[NEW_BLOCK_FILTER.to_string()], sink)
            .await
        {
            self.head_tracker.store(false, Ordering::Release);
            return Err(e);
        }
        info!(job_id = HEAD_TRACKER_ID, "subscription started");
        Ok(())
    }

    /// Latest height seen by the head tracker, zero before the first block.
    pub fn latest_height(&self) -> u64 {
        *self.heights.borrow()
    }

    /// A handle for observing height changes.
    pub fn watch_heights(&self) -> HeadTracker {
        HeadTracker {
            heights: self.heights.subscribe(),
            link: self.connection.link(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
