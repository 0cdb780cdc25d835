//! IngestRunner processor.
//!
//! The IngestRunner is responsible for:
//! - Receiving `TransferEvent`s from the ingest channel
//! - Submitting them to the `EventProcessor`
//! - Re-submitting retryable failures after a backoff delay
//! - Draining in-flight events on shutdown

use crate::events::TransferEventReceiver;
use crate::processors::event_processor::{EventProcessor, SubmitOutcome};
use chintel_sdk::objects::TransferEvent;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

pub struct IngestRunner {
    processor: EventProcessor,
    event_rx: TransferEventReceiver,
    shutdown_rx: watch::Receiver<bool>,
}

impl IngestRunner {
    /// Create a new IngestRunner.
    ///
    /// # Arguments
    ///
    /// * `processor` - Pipeline events are submitted to
    /// * `event_rx` - Receiver side of the ingest channel
    /// * `shutdown_rx` - Receiver for shutdown signal
    pub fn new(
        processor: EventProcessor,
        event_rx: TransferEventReceiver,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            processor,
            event_rx,
            shutdown_rx,
        }
    }

    /// Run the IngestRunner until shutdown or until the channel closes.
    pub async fn run(mut self) {
        info!("IngestRunner started");
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                // Check for shutdown
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("IngestRunner received shutdown signal");
                        break;
                    }
                }

                Some(event) = self.event_rx.recv() => {
                    self.ingest(event, &mut in_flight);
                }

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Event driver task failed");
                    }
                }

                else => {
                    info!("Ingest channel closed");
                    break;
                }
            }
        }

        info!(in_flight = in_flight.len(), "Waiting for in-flight events");
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Event driver task failed");
            }
        }
        self.processor.shutdown().await;

        info!("IngestRunner shutdown complete");
    }

    fn ingest(&self, event: TransferEvent, in_flight: &mut JoinSet<()>) {
        debug!(
            chain_id = event.chain_id,
            tx_hash = %event.tx_hash,
            source = %event.source,
            "Received TransferEvent"
        );

        let SubmitOutcome::Enqueued(handle) = self.processor.submit(event) else {
            return;
        };

        let processor = self.processor.clone();
        in_flight.spawn(async move {
            let event = processor.drive(handle).await;
            debug!(
                tx_hash = %event.tx_hash,
                status = %event.status,
                retry_count = event.retry_count,
                "Event settled"
            );
        });
    }
}
