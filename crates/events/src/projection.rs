use thiserror::Error;

use tania_core::{AggregateId, AggregateType};

use crate::event::EventCodecError;
use crate::record::EventRecord;

/// A projector or bus handler failed while applying an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error("failed to decode event: {0}")]
    Decode(#[from] EventCodecError),

    /// The record skips ahead of the row's high-water-mark.
    #[error("sequence gap for {aggregate_id} (last applied {last}, received {found})")]
    SequenceGap {
        aggregate_id: AggregateId,
        last: u64,
        found: u64,
    },

    /// The projector received a record from an aggregate type it does not consume.
    #[error("projector does not consume '{0}' events")]
    UnexpectedSource(AggregateType),

    /// The event cannot be applied to the current row (e.g. update before create).
    #[error("inconsistent row {aggregate_id}: {message}")]
    Inconsistent {
        aggregate_id: AggregateId,
        message: String,
    },

    /// The read store backend failed.
    #[error("read store failure: {0}")]
    Storage(String),
}

/// Change a projector asks the read store to make to one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowChange<V> {
    Upsert(V),
    Remove,
    Unchanged,
}

/// A projection maps an ordered event onto a mutation of one read-model row.
///
/// The row is the one keyed by the event's aggregate id. Projectors are pure with
/// respect to the row: the read store handles idempotency (high-water-marks),
/// locking and persistence, so a projector only computes the next row value.
///
/// Read models are **disposable**: the store can be cleared and every row recomputed
/// by replaying the event log through the same projector.
pub trait Projector<V>: Send + Sync {
    /// Aggregate types whose events feed this projector (and get replayed on rebuild).
    fn sources(&self) -> &[AggregateType];

    fn project(&self, current: Option<&V>, record: &EventRecord)
    -> Result<RowChange<V>, ProjectionError>;
}

/// Applies another aggregate's events to the rows that reference it.
///
/// Foreign changes must be idempotent by construction (set a flag, copy a name):
/// rows keep their own high-water-mark, which foreign events do not advance.
pub trait ForeignProjector<V>: Send + Sync {
    /// What the record means for this view, decoded once per publish.
    type Fact;

    /// `None` when the record is irrelevant to this view.
    fn interpret(&self, record: &EventRecord) -> Result<Option<Self::Fact>, ProjectionError>;

    fn project(&self, row: &V, fact: &Self::Fact) -> RowChange<V>;
}
