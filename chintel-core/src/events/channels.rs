//! Ingest channel factory and handles.

use chintel_sdk::objects::TransferEvent;
use tokio::sync::mpsc;

/// Default buffer size for event channels.
///
/// Enough to absorb bursts from a listener while keeping memory bounded.
/// A full channel applies backpressure to the producer.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for ingested transfer events.
pub type TransferEventSender = mpsc::Sender<TransferEvent>;
/// Receiver handle for ingested transfer events.
pub type TransferEventReceiver = mpsc::Receiver<TransferEvent>;

/// Create a new ingest channel.
///
/// Returns a (sender, receiver) pair. Listeners and the HTTP ingest
/// endpoint share clones of the sender; the `IngestRunner` owns the receiver.
pub fn transfer_event_channel() -> (TransferEventSender, TransferEventReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
