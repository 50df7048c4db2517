use serde::{Deserialize, Serialize};
use uuid::Uuid;

use reweave_core::AggregateId;

/// One event as it travels between the store, the bus, and the read models.
///
/// The envelope pairs a payload with the stream coordinates needed to
/// apply it in order: which aggregate it belongs to, the stream's type tag
/// (e.g. `"orders.order"`), and its position in that stream. Sequence
/// numbers start at 1 and never repeat within a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    aggregate_id: AggregateId,
    aggregate_type: String,
    sequence_number: u64,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    /// Stream type tag, used to route the envelope to a projection.
    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    /// Position within the aggregate's stream, starting at 1.
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
