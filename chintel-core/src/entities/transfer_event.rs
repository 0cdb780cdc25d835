use crate::entities::{EventSource, EventStatus};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use chintel_sdk::objects::{EventStatus as SdkEventStatus, RiskResult, TransferEvent};
use kanau::processor::Processor;
use parking_lot::Mutex;
use sqlx::types::Json;
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur while persisting events. Always retryable.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store refused the write for another reason
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Identity of a stored event.
///
/// A transaction can emit several transfers, so the hash alone is not
/// unique. Hex fields are lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub chain_id: i64,
    pub tx_hash: String,
    pub from: String,
    pub to: String,
}

impl From<&TransferEvent> for EventKey {
    fn from(event: &TransferEvent) -> Self {
        Self {
            chain_id: event.chain_id,
            tx_hash: event.tx_hash.to_lowercase(),
            from: event.from.to_lowercase(),
            to: event.to.to_lowercase(),
        }
    }
}

/// Mutable processing fields of a stored event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventUpdate {
    pub status: SdkEventStatus,
    pub retry_count: u32,
    pub risk_result: Option<RiskResult>,
    pub last_error: Option<String>,
}

impl From<&TransferEvent> for EventUpdate {
    fn from(event: &TransferEvent) -> Self {
        Self {
            status: event.status,
            retry_count: event.retry_count,
            risk_result: event.risk_result.clone(),
            last_error: event.last_error.clone(),
        }
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert the event, or overwrite the stored copy.
    async fn save(&self, event: &TransferEvent) -> Result<(), StorageError>;

    /// Patch the processing fields of a stored event.
    ///
    /// Returns `false` when no such event is stored yet.
    async fn update(&self, key: &EventKey, update: EventUpdate) -> Result<bool, StorageError>;
}

/// Process-local [`EventStore`].
#[derive(Default)]
pub struct MemoryEventStore {
    events: Mutex<HashMap<EventKey, TransferEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &EventKey) -> Option<TransferEvent> {
        self.events.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn save(&self, event: &TransferEvent) -> Result<(), StorageError> {
        self.events
            .lock()
            .insert(EventKey::from(event), event.clone());
        Ok(())
    }

    async fn update(&self, key: &EventKey, update: EventUpdate) -> Result<bool, StorageError> {
        let mut events = self.events.lock();
        let Some(event) = events.get_mut(key) else {
            return Ok(false);
        };
        event.status = update.status;
        event.retry_count = update.retry_count;
        event.risk_result = update.risk_result;
        event.last_error = update.last_error;
        Ok(true)
    }
}

#[derive(Debug, Clone)]
/// Insert an event, or overwrite the processing fields of the stored row.
pub struct UpsertTransferEvent {
    pub event: TransferEvent,
}

impl Processor<UpsertTransferEvent> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertTransferEvent")]
    async fn process(&self, insert: UpsertTransferEvent) -> Result<(), sqlx::Error> {
        let UpsertTransferEvent { event } = insert;
        let key = EventKey::from(&event);
        sqlx::query(
            r#"
            INSERT INTO transfer_events (
                chain_id, tx_hash, from_address, to_address, value, block_number,
                block_timestamp, method, batch_operation, source, status,
                retry_count, risk_result, last_error
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (chain_id, tx_hash, from_address, to_address) DO UPDATE SET
                status = EXCLUDED.status,
                retry_count = EXCLUDED.retry_count,
                risk_result = EXCLUDED.risk_result,
                last_error = EXCLUDED.last_error,
                updated_at = NOW()
            "#,
        )
        .bind(key.chain_id)
        .bind(key.tx_hash)
        .bind(key.from)
        .bind(key.to)
        .bind(event.value)
        .bind(event.block_number)
        .bind(event.timestamp)
        .bind(event.method)
        .bind(event.batch_operation)
        .bind(EventSource::from(event.source))
        .bind(EventStatus::from(event.status))
        .bind(i32::try_from(event.retry_count).unwrap_or(i32::MAX))
        .bind(event.risk_result.map(Json))
        .bind(event.last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Patch status, retry count, risk result and last error of one event.
///
/// Returns the number of rows touched (0 or 1).
pub struct UpdateTransferEventStatus {
    pub key: EventKey,
    pub update: EventUpdate,
}

impl Processor<UpdateTransferEventStatus> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpdateTransferEventStatus")]
    async fn process(&self, query: UpdateTransferEventStatus) -> Result<u64, sqlx::Error> {
        let UpdateTransferEventStatus { key, update } = query;
        let result = sqlx::query(
            r#"
            UPDATE transfer_events
            SET status = $5,
                retry_count = $6,
                risk_result = $7,
                last_error = $8,
                updated_at = NOW()
            WHERE chain_id = $1 AND tx_hash = $2 AND from_address = $3 AND to_address = $4
            "#,
        )
        .bind(key.chain_id)
        .bind(key.tx_hash)
        .bind(key.from)
        .bind(key.to)
        .bind(EventStatus::from(update.status))
        .bind(i32::try_from(update.retry_count).unwrap_or(i32::MAX))
        .bind(update.risk_result.map(Json))
        .bind(update.last_error)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Postgres-backed [`EventStore`].
pub struct PgEventStore {
    db: DatabaseProcessor,
}

impl PgEventStore {
    pub fn new(db: DatabaseProcessor) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn save(&self, event: &TransferEvent) -> Result<(), StorageError> {
        self.db
            .process(UpsertTransferEvent {
                event: event.clone(),
            })
            .await?;
        Ok(())
    }

    async fn update(&self, key: &EventKey, update: EventUpdate) -> Result<bool, StorageError> {
        let rows = self
            .db
            .process(UpdateTransferEventStatus {
                key: key.clone(),
                update,
            })
            .await?;
        Ok(rows > 0)
    }
}
