//! Long-running processors of the ingestion pipeline.
//!
//! - `EventProcessor`: dedups, queues and runs events through store -> score -> notify
//! - `IngestRunner`: receives `TransferEvent`s from the ingest channel, re-submits retries
//! - `ReplayScheduler`: periodically replays recent blocks through the processor

pub mod event_processor;
pub mod ingest_runner;
pub mod replay_scheduler;

pub use event_processor::{
    EventCollaborators, EventProcessor, ProcessError, ProcessHandle, ProcessOutcome, SubmitOutcome,
};
pub use ingest_runner::IngestRunner;
pub use replay_scheduler::{ReplayError, ReplayScheduler, TickOutcome};
