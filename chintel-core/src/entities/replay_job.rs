use crate::entities::JobStatus;
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use chintel_sdk::objects::{JobStatusStats, ReplayJobResponse};
use itertools::Itertools;
use kanau::processor::Processor;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// One execution of the replay scheduler over one chain.
///
/// `end_time` and `duration` are set exactly when the status is terminal.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ReplayJob {
    pub id: Uuid,
    pub chain_id: i64,
    pub start_block: i64,
    pub end_block: i64,
    pub status: JobStatus,
    pub start_time: OffsetDateTime,
    pub end_time: Option<OffsetDateTime>,
    pub processed_events: i64,
    pub failed_events: i64,
    /// Seconds between `start_time` and `end_time`.
    pub duration: Option<f64>,
    pub error: Option<String>,
    pub retry_count: i32,
}

impl ReplayJob {
    fn new(chain_id: i64, start_block: i64, end_block: i64) -> Self {
        Self {
            id: Uuid::now_v7(),
            chain_id,
            start_block,
            end_block,
            status: JobStatus::Running,
            start_time: OffsetDateTime::now_utc(),
            end_time: None,
            processed_events: 0,
            failed_events: 0,
            duration: None,
            error: None,
            retry_count: 0,
        }
    }

    fn finish(&mut self, status: JobStatus) {
        let now = OffsetDateTime::now_utc();
        self.status = status;
        self.end_time = Some(now);
        self.duration = Some((now - self.start_time).as_seconds_f64().max(0.0));
    }
}

impl From<ReplayJob> for ReplayJobResponse {
    fn from(job: ReplayJob) -> Self {
        Self {
            id: job.id,
            chain_id: job.chain_id,
            start_block: job.start_block,
            end_block: job.end_block,
            status: job.status.into(),
            start_time: job.start_time.unix_timestamp(),
            end_time: job.end_time.map(OffsetDateTime::unix_timestamp),
            processed_events: job.processed_events,
            failed_events: job.failed_events,
            duration: job.duration,
            error: job.error,
            retry_count: job.retry_count,
        }
    }
}

/// Partial update of a running job. Status and timing only change through
/// `complete` and `fail`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub processed_events: Option<i64>,
    pub failed_events: Option<i64>,
    pub error: Option<String>,
}

/// Final counters of a successful job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub processed_events: i64,
    pub failed_events: i64,
}

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("replay job not found: {0}")]
    NotFound(Uuid),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistent record of replay runs.
#[async_trait]
pub trait ReplayJobStore: Send + Sync {
    async fn create(
        &self,
        chain_id: i64,
        start_block: i64,
        end_block: i64,
    ) -> Result<ReplayJob, JobStoreError>;

    async fn update(&self, id: Uuid, update: JobUpdate) -> Result<ReplayJob, JobStoreError>;

    /// Mark the job successful with its final counters.
    async fn complete(&self, id: Uuid, counts: JobCounts) -> Result<ReplayJob, JobStoreError>;

    /// Mark the job failed and bump its retry count.
    async fn fail(&self, id: Uuid, error: &str) -> Result<ReplayJob, JobStoreError>;

    /// Most recent jobs first.
    async fn recent(&self, limit: usize) -> Result<Vec<ReplayJob>, JobStoreError>;

    /// Aggregates per status. Statuses without jobs are absent.
    async fn stats(&self) -> Result<BTreeMap<JobStatus, JobStatusStats>, JobStoreError>;
}

/// Process-local [`ReplayJobStore`].
#[derive(Default)]
pub struct MemoryReplayJobStore {
    jobs: RwLock<HashMap<Uuid, ReplayJob>>,
}

impl MemoryReplayJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn modify(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut ReplayJob),
    ) -> Result<ReplayJob, JobStoreError> {
        let mut jobs = self.jobs.write();
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        apply(job);
        Ok(job.clone())
    }
}

#[async_trait]
impl ReplayJobStore for MemoryReplayJobStore {
    async fn create(
        &self,
        chain_id: i64,
        start_block: i64,
        end_block: i64,
    ) -> Result<ReplayJob, JobStoreError> {
        let job = ReplayJob::new(chain_id, start_block, end_block);
        self.jobs.write().insert(job.id, job.clone());
        Ok(job)
    }

    async fn update(&self, id: Uuid, update: JobUpdate) -> Result<ReplayJob, JobStoreError> {
        self.modify(id, |job| {
            if let Some(processed) = update.processed_events {
                job.processed_events = processed;
            }
            if let Some(failed) = update.failed_events {
                job.failed_events = failed;
            }
            if let Some(error) = update.error {
                job.error = Some(error);
            }
        })
    }

    async fn complete(&self, id: Uuid, counts: JobCounts) -> Result<ReplayJob, JobStoreError> {
        self.modify(id, |job| {
            job.processed_events = counts.processed_events;
            job.failed_events = counts.failed_events;
            job.finish(JobStatus::Success);
        })
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<ReplayJob, JobStoreError> {
        self.modify(id, |job| {
            job.error = Some(error.to_string());
            job.retry_count += 1;
            job.finish(JobStatus::Failed);
        })
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ReplayJob>, JobStoreError> {
        let jobs = self.jobs.read();
        Ok(jobs
            .values()
            .sorted_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<BTreeMap<JobStatus, JobStatusStats>, JobStoreError> {
        let jobs = self.jobs.read();
        Ok(jobs
            .values()
            .into_group_map_by(|job| job.status)
            .into_iter()
            .map(|(status, jobs)| {
                let durations: Vec<f64> = jobs.iter().filter_map(|job| job.duration).collect();
                let avg_duration = (!durations.is_empty())
                    .then(|| durations.iter().sum::<f64>() / durations.len() as f64);
                let stats = JobStatusStats {
                    count: jobs.len() as i64,
                    avg_duration,
                    total_processed: jobs.iter().map(|job| job.processed_events).sum(),
                    total_failed: jobs.iter().map(|job| job.failed_events).sum(),
                };
                (status, stats)
            })
            .collect())
    }
}

const JOB_COLUMNS: &str = "id, chain_id, start_block, end_block, status, start_time, end_time, \
    processed_events, failed_events, duration, error, retry_count";

#[derive(Debug, Clone)]
/// Insert a new running job.
pub struct InsertReplayJob {
    pub id: Uuid,
    pub chain_id: i64,
    pub start_block: i64,
    pub end_block: i64,
}

impl Processor<InsertReplayJob> for DatabaseProcessor {
    type Output = ReplayJob;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertReplayJob")]
    async fn process(&self, insert: InsertReplayJob) -> Result<ReplayJob, sqlx::Error> {
        let sql = format!(
            "INSERT INTO replay_jobs (id, chain_id, start_block, end_block, status, start_time) \
             VALUES ($1, $2, $3, $4, 'running', NOW()) \
             RETURNING {JOB_COLUMNS}"
        );
        sqlx::query_as::<_, ReplayJob>(&sql)
            .bind(insert.id)
            .bind(insert.chain_id)
            .bind(insert.start_block)
            .bind(insert.end_block)
            .fetch_one(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Patch counters and error message of a job.
pub struct UpdateReplayJob {
    pub id: Uuid,
    pub update: JobUpdate,
}

impl Processor<UpdateReplayJob> for DatabaseProcessor {
    type Output = Option<ReplayJob>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpdateReplayJob")]
    async fn process(&self, query: UpdateReplayJob) -> Result<Option<ReplayJob>, sqlx::Error> {
        let UpdateReplayJob { id, update } = query;
        let sql = format!(
            "UPDATE replay_jobs SET \
                processed_events = COALESCE($2, processed_events), \
                failed_events = COALESCE($3, failed_events), \
                error = COALESCE($4, error) \
             WHERE id = $1 \
             RETURNING {JOB_COLUMNS}"
        );
        sqlx::query_as::<_, ReplayJob>(&sql)
            .bind(id)
            .bind(update.processed_events)
            .bind(update.failed_events)
            .bind(update.error)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Mark a job successful.
pub struct CompleteReplayJob {
    pub id: Uuid,
    pub counts: JobCounts,
}

impl Processor<CompleteReplayJob> for DatabaseProcessor {
    type Output = Option<ReplayJob>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CompleteReplayJob")]
    async fn process(&self, query: CompleteReplayJob) -> Result<Option<ReplayJob>, sqlx::Error> {
        let sql = format!(
            "UPDATE replay_jobs SET \
                status = 'success', \
                end_time = NOW(), \
                duration = GREATEST(EXTRACT(EPOCH FROM (NOW() - start_time)), 0)::float8, \
                processed_events = $2, \
                failed_events = $3 \
             WHERE id = $1 \
             RETURNING {JOB_COLUMNS}"
        );
        sqlx::query_as::<_, ReplayJob>(&sql)
            .bind(query.id)
            .bind(query.counts.processed_events)
            .bind(query.counts.failed_events)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Mark a job failed and bump its retry count.
pub struct FailReplayJob {
    pub id: Uuid,
    pub error: String,
}

impl Processor<FailReplayJob> for DatabaseProcessor {
    type Output = Option<ReplayJob>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:FailReplayJob")]
    async fn process(&self, query: FailReplayJob) -> Result<Option<ReplayJob>, sqlx::Error> {
        let sql = format!(
            "UPDATE replay_jobs SET \
                status = 'failed', \
                end_time = NOW(), \
                duration = GREATEST(EXTRACT(EPOCH FROM (NOW() - start_time)), 0)::float8, \
                error = $2, \
                retry_count = retry_count + 1 \
             WHERE id = $1 \
             RETURNING {JOB_COLUMNS}"
        );
        sqlx::query_as::<_, ReplayJob>(&sql)
            .bind(query.id)
            .bind(query.error)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// List the most recent jobs, newest first.
pub struct ListRecentReplayJobs {
    pub limit: i64,
}

impl Processor<ListRecentReplayJobs> for DatabaseProcessor {
    type Output = Vec<ReplayJob>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListRecentReplayJobs")]
    async fn process(&self, query: ListRecentReplayJobs) -> Result<Vec<ReplayJob>, sqlx::Error> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM replay_jobs \
             ORDER BY start_time DESC, id DESC \
             LIMIT $1"
        );
        sqlx::query_as::<_, ReplayJob>(&sql)
            .bind(query.limit)
            .fetch_all(&self.pool)
            .await
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ReplayJobStatsRow {
    status: JobStatus,
    count: i64,
    avg_duration: Option<f64>,
    total_processed: i64,
    total_failed: i64,
}

#[derive(Debug, Clone)]
/// Aggregate jobs by status.
pub struct GetReplayJobStats;

impl Processor<GetReplayJobStats> for DatabaseProcessor {
    type Output = BTreeMap<JobStatus, JobStatusStats>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetReplayJobStats")]
    async fn process(
        &self,
        _query: GetReplayJobStats,
    ) -> Result<BTreeMap<JobStatus, JobStatusStats>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ReplayJobStatsRow>(
            r#"
            SELECT
                status,
                COUNT(*) AS count,
                AVG(duration) AS avg_duration,
                COALESCE(SUM(processed_events), 0)::bigint AS total_processed,
                COALESCE(SUM(failed_events), 0)::bigint AS total_failed
            FROM replay_jobs
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let stats = JobStatusStats {
                    count: row.count,
                    avg_duration: row.avg_duration,
                    total_processed: row.total_processed,
                    total_failed: row.total_failed,
                };
                (row.status, stats)
            })
            .collect())
    }
}

/// Postgres-backed [`ReplayJobStore`].
pub struct PgReplayJobStore {
    db: DatabaseProcessor,
}

impl PgReplayJobStore {
    pub fn new(db: DatabaseProcessor) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReplayJobStore for PgReplayJobStore {
    async fn create(
        &self,
        chain_id: i64,
        start_block: i64,
        end_block: i64,
    ) -> Result<ReplayJob, JobStoreError> {
        let job = self
            .db
            .process(InsertReplayJob {
                id: Uuid::now_v7(),
                chain_id,
                start_block,
                end_block,
            })
            .await?;
        Ok(job)
    }

    async fn update(&self, id: Uuid, update: JobUpdate) -> Result<ReplayJob, JobStoreError> {
        self.db
            .process(UpdateReplayJob { id, update })
            .await?
            .ok_or(JobStoreError::NotFound(id))
    }

    async fn complete(&self, id: Uuid, counts: JobCounts) -> Result<ReplayJob, JobStoreError> {
        self.db
            .process(CompleteReplayJob { id, counts })
            .await?
            .ok_or(JobStoreError::NotFound(id))
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<ReplayJob, JobStoreError> {
        self.db
            .process(FailReplayJob {
                id,
                error: error.to_string(),
            })
            .await?
            .ok_or(JobStoreError::NotFound(id))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ReplayJob>, JobStoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Ok(self.db.process(ListRecentReplayJobs { limit }).await?)
    }

    async fn stats(&self) -> Result<BTreeMap<JobStatus, JobStatusStats>, JobStoreError> {
        Ok(self.db.process(GetReplayJobStats).await?)
    }
}
