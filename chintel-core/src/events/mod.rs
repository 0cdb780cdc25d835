//! Event channels feeding the processing pipeline.
//!
//! # Event Flow
//!
//! 1. Listeners and `POST /events` send `TransferEvent` -> `IngestRunner`
//! 2. `IngestRunner` submits to `EventProcessor`, which dedups and queues
//! 3. Retryable failures come back to the `IngestRunner`, which re-submits
//!    them after a backoff delay
//!
//! Replayed events skip the channel and are submitted by the chain provider.

pub mod channels;

pub use channels::{
    DEFAULT_CHANNEL_BUFFER, TransferEventReceiver, TransferEventSender, transfer_event_channel,
};
