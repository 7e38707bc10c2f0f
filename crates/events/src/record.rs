use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use tania_core::{AggregateId, AggregateType};

use crate::event::{DomainEvent, EventCodecError};

/// An event as stored in (and published from) the event store.
///
/// This is the unit appended to a stream and delivered on the bus.
///
/// Notes:
/// - **Append-only**: `sequence` is assigned by the store, 1-based, gap-free per aggregate.
/// - `payload` is the JSON body of the event; its schema is fixed by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    event_id: Uuid,
    aggregate_id: AggregateId,
    aggregate_type: AggregateType,

    /// Position in the aggregate stream (1 = creation event).
    sequence: u64,

    kind: String,
    payload: JsonValue,
    occurred_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn new(
        aggregate_type: AggregateType,
        aggregate_id: AggregateId,
        sequence: u64,
        event: NewEvent,
    ) -> Self {
        Self {
            event_id: event.event_id,
            aggregate_id,
            aggregate_type,
            sequence,
            kind: event.kind,
            payload: event.payload,
            occurred_at: event.occurred_at,
        }
    }

    /// Reassemble a record read back from durable storage.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        event_id: Uuid,
        aggregate_type: AggregateType,
        aggregate_id: AggregateId,
        sequence: u64,
        kind: impl Into<String>,
        payload: JsonValue,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            aggregate_id,
            aggregate_type,
            sequence,
            kind: kind.into(),
            payload,
            occurred_at,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> AggregateType {
        self.aggregate_type
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Decode the payload into the aggregate's typed event.
    pub fn decode<E: DomainEvent>(&self) -> Result<E, EventCodecError> {
        E::decode(&self.kind, &self.payload)
    }
}

/// An event ready to be appended (not yet assigned a sequence number).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_id: Uuid,
    pub kind: String,
    pub payload: JsonValue,
    pub occurred_at: DateTime<Utc>,
}

impl NewEvent {
    pub fn new(kind: impl Into<String>, payload: JsonValue, occurred_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            kind: kind.into(),
            payload,
            occurred_at,
        }
    }

    /// Encode a typed domain event.
    pub fn from_domain<E: DomainEvent>(event: &E) -> Result<Self, EventCodecError> {
        Ok(Self::new(event.kind(), event.encode()?, event.occurred_at()))
    }
}
