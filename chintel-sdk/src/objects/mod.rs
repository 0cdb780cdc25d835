pub mod events;
pub mod replay;
pub mod risk;

pub use events::{EventAccepted, EventSource, EventStatus, TransferEvent};
pub use replay::{
    JobStatsResponse, JobStatus, JobStatusStats, ListJobsQuery, ReplayJobResponse, TickAccepted,
};
pub use risk::{RiskLevel, RiskResult};
