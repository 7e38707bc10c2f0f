use std::sync::Arc;

use thiserror::Error;

use tania_core::{AggregateId, AggregateType, ExpectedVersion};
use tania_events::{EventRecord, NewEvent};

/// Event store operation error.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to domain
/// errors (validation, invariants).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventStoreError {
    /// Optimistic concurrency check failed; the log is unchanged.
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// The batch or the stored stream is malformed.
    #[error("invalid append: {0}")]
    InvalidAppend(String),

    /// The backend failed (I/O, connection, poisoned lock).
    #[error("event store failure: {0}")]
    Storage(String),
}

/// Result of a successful append.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed {
    /// Stream version after the append (sequence of the last record).
    pub version: u64,
    /// Records in sequence order, as they will be published.
    pub records: Vec<EventRecord>,
}

/// Ordered snapshot of one aggregate stream.
///
/// The snapshot is taken when it is returned and can be iterated any number of times;
/// later appends are not visible through it.
#[derive(Debug, Clone)]
pub struct EventStream {
    aggregate_type: AggregateType,
    aggregate_id: AggregateId,
    records: Arc<[EventRecord]>,
}

impl EventStream {
    pub fn new(
        aggregate_type: AggregateType,
        aggregate_id: AggregateId,
        records: impl Into<Arc<[EventRecord]>>,
    ) -> Self {
        Self {
            aggregate_type,
            aggregate_id,
            records: records.into(),
        }
    }

    pub fn aggregate_type(&self) -> AggregateType {
        self.aggregate_type
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    /// Sequence of the last record (0 for a stream that does not exist).
    pub fn version(&self) -> u64 {
        self.records.last().map(EventRecord::sequence).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EventRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }
}

impl<'a> IntoIterator for &'a EventStream {
    type Item = &'a EventRecord;
    type IntoIter = std::slice::Iter<'a, EventRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Append-only event store, partitioned by aggregate type.
///
/// Each aggregate owns one stream keyed by `(aggregate_type, aggregate_id)`. Within a
/// stream, records carry gap-free sequence numbers starting at 1.
///
/// ## Append Semantics
///
/// `append()`:
/// - checks `expected` against the current stream version (mismatch → `Conflict`,
///   stream unchanged)
/// - assigns sequence numbers starting at `current_version + 1`
/// - persists the batch atomically (all or nothing)
/// - treats an empty batch as a no-op that reports the current version
///
/// ## Load Semantics
///
/// `events_of()` returns the stream in sequence order (empty when the aggregate was
/// never created). `all_events()` returns every record of a type ordered by
/// `(aggregate_id, sequence)`; rebuilds replay it.
pub trait EventStore: Send + Sync {
    fn append(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: AggregateId,
        expected: ExpectedVersion,
        events: Vec<NewEvent>,
    ) -> Result<Committed, EventStoreError>;

    fn events_of(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: AggregateId,
    ) -> Result<EventStream, EventStoreError>;

    fn all_events(&self, aggregate_type: AggregateType) -> Result<Vec<EventRecord>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: AggregateId,
        expected: ExpectedVersion,
        events: Vec<NewEvent>,
    ) -> Result<Committed, EventStoreError> {
        (**self).append(aggregate_type, aggregate_id, expected, events)
    }

    fn events_of(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: AggregateId,
    ) -> Result<EventStream, EventStoreError> {
        (**self).events_of(aggregate_type, aggregate_id)
    }

    fn all_events(&self, aggregate_type: AggregateType) -> Result<Vec<EventRecord>, EventStoreError> {
        (**self).all_events(aggregate_type)
    }
}
