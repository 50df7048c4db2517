//! Command execution pipeline.
//!
//! Orchestrates the full event-sourcing lifecycle for a command: load the
//! stream, rehydrate the aggregate, handle the command, append the decided
//! events with an optimistic concurrency check, and publish them to the
//! bus. Domain code stays pure; all IO happens through the injected store
//! and bus traits.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use reweave_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use reweave_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure (e.g. stale aggregate version).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),
    /// Domain validation failure (deterministic).
    #[error("validation failed: {0}")]
    Validation(String),
    /// Domain invariant failure (deterministic).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    /// Not enough free stock for the requested quantity.
    #[error("insufficient inventory: {0}")]
    InsufficientInventory(String),
    /// The aggregate is in a state that forbids the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Payment already recorded for the order.
    #[error("order already paid")]
    AlreadyPaid,
    /// Domain authorization failure.
    #[error("unauthorized")]
    Unauthorized,
    /// Domain-level not found.
    #[error("not found")]
    NotFound,
    /// Failed to deserialize historical event payloads into the aggregate event type.
    #[error("event deserialization failed: {0}")]
    Deserialize(String),
    /// Persisting to the event store failed.
    #[error("event store error: {0}")]
    Store(EventStoreError),
    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    #[error("publish failed after append: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::InsufficientInventory(msg) => DispatchError::InsufficientInventory(msg),
            DomainError::InvalidState(msg) => DispatchError::InvalidState(msg),
            DomainError::AlreadyPaid => DispatchError::AlreadyPaid,
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Events are persisted before publication; if the append fails nothing is
/// published. If publication fails after a successful append the error is
/// surfaced, and since the events are already durable the delivery
/// semantics downstream are at-least-once.
///
/// The `make_aggregate` factory keeps the dispatcher generic over aggregate
/// types; domain code controls initialization (e.g. `Cart::empty(id)`).
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full pipeline and return the
    /// committed events with their assigned sequence numbers.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: reweave_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate aggregate
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic)
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Publish committed events (after append)
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Rehydrate an aggregate without dispatching a command. Used by
    /// services that need to read state before deciding what to do.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Ensure the stream belongs to the requested aggregate and has
    // monotonically increasing sequence numbers even if the backend is buggy.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                format!("loaded stream contains wrong aggregate_id at index {idx}"),
            )));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                format!(
                    "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                    e.sequence_number
                ),
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    // Ensure deterministic ordering.
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reweave_events::InMemoryEventBus;
    use reweave_inventory::{
        CreateStockRecord, MovementSource, ReserveStock, StockCommand, StockRecord, StockRecordId,
    };

    use crate::event_store::InMemoryEventStore;

    fn dispatcher() -> CommandDispatcher<InMemoryEventStore, InMemoryEventBus<EventEnvelope<JsonValue>>>
    {
        CommandDispatcher::new(InMemoryEventStore::new(), InMemoryEventBus::new())
    }

    #[test]
    fn dispatch_persists_and_rehydrates() {
        let dispatcher = dispatcher();
        let record_id = StockRecordId::new(AggregateId::new());

        dispatcher
            .dispatch::<StockRecord>(
                record_id.0,
                "inventory.record",
                StockCommand::CreateStockRecord(CreateStockRecord {
                    record_id,
                    product_id: AggregateId::new(),
                    variant_id: None,
                    initial_quantity: 10,
                    low_stock_threshold: 2,
                    reorder_point: 4,
                    occurred_at: Utc::now(),
                }),
                |id| StockRecord::empty(StockRecordId::new(id)),
            )
            .unwrap();

        dispatcher
            .dispatch::<StockRecord>(
                record_id.0,
                "inventory.record",
                StockCommand::ReserveStock(ReserveStock {
                    record_id,
                    quantity: 4,
                    source: MovementSource::Manual,
                    occurred_at: Utc::now(),
                }),
                |id| StockRecord::empty(StockRecordId::new(id)),
            )
            .unwrap();

        let record = dispatcher
            .load(record_id.0, |id| StockRecord::empty(StockRecordId::new(id)))
            .unwrap();
        assert_eq!(record.quantity_reserved(), 4);
        assert_eq!(record.free(), 6);
    }

    #[test]
    fn domain_errors_map_to_dispatch_errors() {
        let dispatcher = dispatcher();
        let record_id = StockRecordId::new(AggregateId::new());

        let err = dispatcher
            .dispatch::<StockRecord>(
                record_id.0,
                "inventory.record",
                StockCommand::ReserveStock(ReserveStock {
                    record_id,
                    quantity: 1,
                    source: MovementSource::Manual,
                    occurred_at: Utc::now(),
                }),
                |id| StockRecord::empty(StockRecordId::new(id)),
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound));
    }
}
