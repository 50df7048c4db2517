//! Durable event log on Postgres, behind the `postgres` feature.
//!
//! One `events` table, append-only, with a unique constraint on
//! `(aggregate_id, sequence_number)`. Version checks run inside a
//! transaction; a racing writer that slips past the check still loses on
//! the constraint, and code `23505` is reported as a concurrency error.

use std::sync::Arc;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{instrument, Span};

use reweave_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(self), fields(aggregate_id = %aggregate_id.as_uuid()), err)]
    pub async fn load_stream_async(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            "SELECT event_id, aggregate_id, aggregate_type, sequence_number, \
             event_type, event_version, occurred_at, payload \
             FROM events WHERE aggregate_id = $1 ORDER BY sequence_number",
        )
        .bind(aggregate_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| storage_error("load_stream", e))?;

        let events = rows
            .iter()
            .map(row_to_event)
            .collect::<Result<Vec<_>, _>>()?;

        Span::current().record("event_count", events.len());
        Ok(events)
    }

    #[instrument(
        skip(self, events),
        fields(
            aggregate_id = %aggregate_id.as_uuid(),
            event_count = events.len(),
            expected_version = ?expected_version
        ),
        err
    )]
    pub async fn append_events(
        &self,
        aggregate_id: AggregateId,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        for (idx, e) in events.iter().enumerate() {
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
        }
        let aggregate_type = events[0].aggregate_type.clone();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("begin_transaction", e))?;

        let (head, stream_type) = stream_head(&mut tx, aggregate_id).await?;

        if let Some(existing) = stream_type.filter(|t| *t != aggregate_type) {
            rollback(tx).await?;
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "stream aggregate_type is '{existing}', attempted append with '{aggregate_type}'"
            )));
        }
        if !expected_version.matches(head) {
            rollback(tx).await?;
            return Err(EventStoreError::Concurrency(format!(
                "optimistic concurrency check failed: expected {expected_version:?}, found {head}"
            )));
        }

        let mut committed = Vec::with_capacity(events.len());
        for (event, sequence_number) in events.into_iter().zip(head + 1..) {
            sqlx::query(
                "INSERT INTO events \
                 (event_id, aggregate_id, aggregate_type, sequence_number, \
                  event_type, event_version, occurred_at, payload) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(event.event_id)
            .bind(aggregate_id.as_uuid())
            .bind(&aggregate_type)
            .bind(sequence_number as i64)
            .bind(&event.event_type)
            .bind(event.event_version as i32)
            .bind(event.occurred_at)
            .bind(&event.payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("insert_event", e))?;

            committed.push(StoredEvent {
                event_id: event.event_id,
                aggregate_id: event.aggregate_id,
                aggregate_type: event.aggregate_type,
                sequence_number,
                event_type: event.event_type,
                event_version: event.event_version,
                occurred_at: event.occurred_at,
                payload: event.payload,
            });
        }

        tx.commit()
            .await
            .map_err(|e| storage_error("commit_transaction", e))?;

        Span::current().record("committed_events", committed.len());
        Ok(committed)
    }
}

/// Head sequence number and aggregate type of a stream; `(0, None)` when
/// the stream has never been written.
async fn stream_head(
    tx: &mut Transaction<'_, Postgres>,
    aggregate_id: AggregateId,
) -> Result<(u64, Option<String>), EventStoreError> {
    let row = sqlx::query(
        "SELECT COALESCE(MAX(sequence_number), 0) AS head, MAX(aggregate_type) AS stream_type \
         FROM events WHERE aggregate_id = $1",
    )
    .bind(aggregate_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| storage_error("stream_head", e))?;

    let head: i64 = column(&row, "head")?;
    let stream_type: Option<String> = column(&row, "stream_type")?;
    Ok((head.max(0) as u64, stream_type))
}

async fn rollback(tx: Transaction<'_, Postgres>) -> Result<(), EventStoreError> {
    tx.rollback().await.map_err(|e| storage_error("rollback", e))
}

fn column<'r, T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>>(
    row: &'r PgRow,
    name: &str,
) -> Result<T, EventStoreError> {
    row.try_get(name)
        .map_err(|e| EventStoreError::InvalidAppend(format!("failed to read column {name}: {e}")))
}

fn row_to_event(row: &PgRow) -> Result<StoredEvent, EventStoreError> {
    let aggregate_id: uuid::Uuid = column(row, "aggregate_id")?;
    let sequence_number: i64 = column(row, "sequence_number")?;
    let event_version: i32 = column(row, "event_version")?;

    Ok(StoredEvent {
        event_id: column(row, "event_id")?,
        aggregate_id: AggregateId::from_uuid(aggregate_id),
        aggregate_type: column(row, "aggregate_type")?,
        sequence_number: sequence_number.max(0) as u64,
        event_type: column(row, "event_type")?,
        event_version: event_version.max(0) as u32,
        occurred_at: column(row, "occurred_at")?,
        payload: column(row, "payload")?,
    })
}

fn storage_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            // 23505 = unique_violation on (aggregate_id, sequence_number).
            if db_err.code().as_deref() == Some("23505") {
                EventStoreError::Concurrency(msg)
            } else {
                EventStoreError::InvalidAppend(msg)
            }
        }
        sqlx::Error::PoolClosed => {
            EventStoreError::InvalidAppend(format!("connection pool closed in {operation}"))
        }
        other => EventStoreError::InvalidAppend(format!("sqlx error in {operation}: {other}")),
    }
}

impl EventStore for PostgresEventStore {
    // The trait is synchronous; bridge onto the ambient tokio runtime.
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };
        let aggregate_id = first.aggregate_id;
        runtime()?.block_on(self.append_events(aggregate_id, events, expected_version))
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        runtime()?.block_on(self.load_stream_async(aggregate_id))
    }
}

fn runtime() -> Result<tokio::runtime::Handle, EventStoreError> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        EventStoreError::InvalidAppend("PostgresEventStore requires a tokio runtime".to_string())
    })
}
