//! Event publishing abstraction (mechanics only).
//!
//! The bus distributes **committed** events to the projectors of every bounded
//! context. It is synchronous: `publish` returns only after each handler subscribed
//! to the event's kind has run, so a command that returns has already updated every
//! read model (read-your-own-writes without distributed coordination).
//!
//! ```text
//! Command → Event Store (append) → Event Bus (publish) → Handlers
//!                                                          ├─ own read store
//!                                                          └─ cross-context read stores
//! ```
//!
//! Handler failures never unwind the append: the event store is the source of truth.
//! A failing handler is reported in the [`PublishReport`] and logged; the affected
//! read model row is left flagged as possibly stale until a rebuild.

use std::sync::Arc;

use crate::projection::ProjectionError;
use crate::record::EventRecord;

/// Callback invoked for each delivered record.
pub type EventHandler = Arc<dyn Fn(&EventRecord) -> Result<(), ProjectionError> + Send + Sync>;

/// One handler that returned an error during a publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub handler_id: String,
    pub error: ProjectionError,
}

/// Outcome of delivering one record to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishReport {
    /// Handlers that ran (successfully or not).
    pub delivered: usize,
    pub failures: Vec<HandlerFailure>,
}

impl PublishReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: PublishReport) {
        self.delivered += other.delivered;
        self.failures.extend(other.failures);
    }
}

/// In-process, synchronous event bus.
///
/// Subscriptions are fixed when the bus is built; the trait only exposes delivery.
pub trait EventBus: Send + Sync {
    /// Deliver `record` to every handler subscribed to its kind, in registration order.
    fn publish(&self, record: &EventRecord) -> PublishReport;
}

impl<B> EventBus for Arc<B>
where
    B: EventBus + ?Sized,
{
    fn publish(&self, record: &EventRecord) -> PublishReport {
        (**self).publish(record)
    }
}
