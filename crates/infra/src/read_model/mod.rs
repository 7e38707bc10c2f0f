//! Read model storage.
//!
//! Rows are disposable: a [`ReadStore`] can be cleared and recomputed at any time by
//! replaying the event log through its projector. Backends only persist
//! [`StoredRow`]s; idempotency and rebuild live in [`ReadStore`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tania_core::AggregateId;

pub mod in_memory;
pub mod postgres;
pub mod store;

pub use in_memory::InMemoryRowStore;
pub use postgres::PostgresRowStore;
pub use store::{Applied, ManagedView, ReadStore, RebuildStats};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadStoreError {
    #[error("{view} row {id} not found")]
    NotFound { view: &'static str, id: AggregateId },

    #[error("read store failure: {0}")]
    Storage(String),
}

/// One persisted row plus its projection bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow<V> {
    /// `None` is a tombstone: the row was removed but keeps its high-water-mark.
    pub row: Option<V>,
    /// Sequence of the last event of the row's aggregate folded into it.
    pub last_applied_sequence: u64,
    /// Set when an event could not be applied; cleared only by a rebuild.
    pub possibly_stale: bool,
}

impl<V> StoredRow<V> {
    pub fn is_tombstone(&self) -> bool {
        self.row.is_none()
    }
}

/// Mutation callback run under a row's lock.
///
/// It receives the current slot (`None` when the row was never written) and returns
/// `true` when it changed the slot and the change must be persisted.
pub type RowMutation<'a, V> = &'a mut dyn FnMut(&mut Option<StoredRow<V>>) -> bool;

/// Storage backend for one view's rows.
///
/// `modify` is the only write path and is a single-row critical section: concurrent
/// calls for the same id are serialized, calls for different ids are not.
pub trait RowStore<V>: Send + Sync {
    fn get(&self, id: AggregateId) -> Result<Option<StoredRow<V>>, ReadStoreError>;

    /// Every stored row (tombstones included), ordered by id.
    fn all(&self) -> Result<Vec<(AggregateId, StoredRow<V>)>, ReadStoreError>;

    fn modify(&self, id: AggregateId, mutation: RowMutation<'_, V>) -> Result<(), ReadStoreError>;

    fn clear(&self) -> Result<(), ReadStoreError>;
}

impl<V, S> RowStore<V> for Arc<S>
where
    S: RowStore<V> + ?Sized,
{
    fn get(&self, id: AggregateId) -> Result<Option<StoredRow<V>>, ReadStoreError> {
        (**self).get(id)
    }

    fn all(&self) -> Result<Vec<(AggregateId, StoredRow<V>)>, ReadStoreError> {
        (**self).all()
    }

    fn modify(&self, id: AggregateId, mutation: RowMutation<'_, V>) -> Result<(), ReadStoreError> {
        (**self).modify(id, mutation)
    }

    fn clear(&self) -> Result<(), ReadStoreError> {
        (**self).clear()
    }
}
