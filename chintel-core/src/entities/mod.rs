pub mod replay_job;
pub mod transfer_event;

use chintel_sdk::objects::{
    EventSource as SdkEventSource, EventStatus as SdkEventStatus, JobStatus as SdkJobStatus,
};

/// Event status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `chintel_sdk::objects::EventStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "event_status")]
pub enum EventStatus {
    Pending,
    Processing,
    Success,
    Failed,
    AiFailed,
}

impl From<EventStatus> for SdkEventStatus {
    fn from(value: EventStatus) -> Self {
        match value {
            EventStatus::Pending => SdkEventStatus::Pending,
            EventStatus::Processing => SdkEventStatus::Processing,
            EventStatus::Success => SdkEventStatus::Success,
            EventStatus::Failed => SdkEventStatus::Failed,
            EventStatus::AiFailed => SdkEventStatus::AiFailed,
        }
    }
}

impl From<SdkEventStatus> for EventStatus {
    fn from(value: SdkEventStatus) -> Self {
        match value {
            SdkEventStatus::Pending => EventStatus::Pending,
            SdkEventStatus::Processing => EventStatus::Processing,
            SdkEventStatus::Success => EventStatus::Success,
            SdkEventStatus::Failed => EventStatus::Failed,
            SdkEventStatus::AiFailed => EventStatus::AiFailed,
        }
    }
}

/// Event source for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `chintel_sdk::objects::EventSource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "event_source")]
pub enum EventSource {
    Live,
    Replay,
}

impl From<EventSource> for SdkEventSource {
    fn from(value: EventSource) -> Self {
        match value {
            EventSource::Live => SdkEventSource::Live,
            EventSource::Replay => SdkEventSource::Replay,
        }
    }
}

impl From<SdkEventSource> for EventSource {
    fn from(value: SdkEventSource) -> Self {
        match value {
            SdkEventSource::Live => EventSource::Live,
            SdkEventSource::Replay => EventSource::Replay,
        }
    }
}

/// Replay job status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `chintel_sdk::objects::JobStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "replay_job_status")]
pub enum JobStatus {
    Running,
    Success,
    Failed,
}

impl From<JobStatus> for SdkJobStatus {
    fn from(value: JobStatus) -> Self {
        match value {
            JobStatus::Running => SdkJobStatus::Running,
            JobStatus::Success => SdkJobStatus::Success,
            JobStatus::Failed => SdkJobStatus::Failed,
        }
    }
}

impl From<SdkJobStatus> for JobStatus {
    fn from(value: SdkJobStatus) -> Self {
        match value {
            SdkJobStatus::Running => JobStatus::Running,
            SdkJobStatus::Success => JobStatus::Success,
            SdkJobStatus::Failed => JobStatus::Failed,
        }
    }
}
