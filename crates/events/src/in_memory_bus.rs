//! Synchronous in-process event bus and its subscription table.

use std::collections::HashMap;
use std::sync::Arc;

use crate::bus::{EventBus, EventHandler, HandlerFailure, PublishReport};
use crate::record::EventRecord;

struct Subscription {
    handler_id: String,
    handler: EventHandler,
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("handler_id", &self.handler_id)
            .finish_non_exhaustive()
    }
}

enum KindFilter {
    Exact(String),
    Any,
}

/// Collects subscriptions during start-up wiring.
#[derive(Default)]
pub struct SubscriptionTableBuilder {
    entries: Vec<(KindFilter, Subscription)>,
}

impl SubscriptionTableBuilder {
    /// Subscribe `handler` to one event kind.
    pub fn subscribe(
        &mut self,
        kind: impl Into<String>,
        handler_id: impl Into<String>,
        handler: EventHandler,
    ) -> &mut Self {
        self.entries.push((
            KindFilter::Exact(kind.into()),
            Subscription {
                handler_id: handler_id.into(),
                handler,
            },
        ));
        self
    }

    /// Subscribe the same handler to several kinds.
    pub fn subscribe_many<'k>(
        &mut self,
        kinds: impl IntoIterator<Item = &'k str>,
        handler_id: &str,
        handler: EventHandler,
    ) -> &mut Self {
        for kind in kinds {
            self.subscribe(kind, handler_id, handler.clone());
        }
        self
    }

    /// Subscribe to every kind (audit trails, logging).
    pub fn subscribe_all(&mut self, handler_id: impl Into<String>, handler: EventHandler) -> &mut Self {
        self.entries.push((
            KindFilter::Any,
            Subscription {
                handler_id: handler_id.into(),
                handler,
            },
        ));
        self
    }

    /// Freeze the table. Per-kind handler lists are resolved here, once.
    pub fn build(self) -> SubscriptionTable {
        let mut by_kind: HashMap<String, Vec<usize>> = HashMap::new();
        let mut wildcard = Vec::new();
        let mut subscriptions = Vec::with_capacity(self.entries.len());

        for (kind, _) in &self.entries {
            if let KindFilter::Exact(kind) = kind {
                by_kind.entry(kind.clone()).or_default();
            }
        }

        for (idx, (filter, subscription)) in self.entries.into_iter().enumerate() {
            match filter {
                KindFilter::Exact(kind) => {
                    by_kind.entry(kind).or_default().push(idx);
                }
                KindFilter::Any => {
                    wildcard.push(idx);
                    for handlers in by_kind.values_mut() {
                        handlers.push(idx);
                    }
                }
            }
            subscriptions.push(subscription);
        }

        // Wildcards were appended in registration order; restore the global order
        // for kinds that also have later exact subscriptions.
        for handlers in by_kind.values_mut() {
            handlers.sort_unstable();
        }

        SubscriptionTable {
            subscriptions,
            by_kind,
            wildcard,
        }
    }
}

/// Immutable mapping from event kind to its ordered handler list.
///
/// Built once during composition and shared by reference; never mutated while
/// events are being dispatched.
#[derive(Debug)]
pub struct SubscriptionTable {
    subscriptions: Vec<Subscription>,
    by_kind: HashMap<String, Vec<usize>>,
    wildcard: Vec<usize>,
}

impl SubscriptionTable {
    pub fn builder() -> SubscriptionTableBuilder {
        SubscriptionTableBuilder::default()
    }

    pub fn empty() -> Self {
        SubscriptionTableBuilder::default().build()
    }

    /// Handler ids that will receive `kind`, in delivery order.
    pub fn handlers_for(&self, kind: &str) -> Vec<&str> {
        self.indices_for(kind)
            .iter()
            .map(|&idx| self.subscriptions[idx].handler_id.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    fn indices_for(&self, kind: &str) -> &[usize] {
        self.by_kind
            .get(kind)
            .map(Vec::as_slice)
            .unwrap_or(self.wildcard.as_slice())
    }
}

/// In-memory synchronous bus.
///
/// - No IO / no async
/// - Handlers run on the publishing thread, in registration order
/// - At-least-once acceptable (handlers must be idempotent)
#[derive(Debug, Clone)]
pub struct InMemoryEventBus {
    table: Arc<SubscriptionTable>,
}

impl InMemoryEventBus {
    pub fn new(table: Arc<SubscriptionTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &SubscriptionTable {
        &self.table
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(&self, record: &EventRecord) -> PublishReport {
        let mut report = PublishReport::default();

        for &idx in self.table.indices_for(record.kind()) {
            let subscription = &self.table.subscriptions[idx];
            report.delivered += 1;

            if let Err(error) = (subscription.handler)(record) {
                tracing::error!(
                    handler_id = %subscription.handler_id,
                    kind = %record.kind(),
                    aggregate_type = %record.aggregate_type(),
                    aggregate_id = %record.aggregate_id(),
                    sequence = record.sequence(),
                    error = %error,
                    "event handler failed; read model left stale until rebuild"
                );
                report.failures.push(HandlerFailure {
                    handler_id: subscription.handler_id.clone(),
                    error,
                });
            }
        }

        if report.delivered == 0 {
            tracing::debug!(kind = %record.kind(), "published event has no subscribers");
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;
    use serde_json::json;

    use tania_core::{AggregateId, AggregateType};

    use super::*;
    use crate::projection::ProjectionError;
    use crate::record::NewEvent;

    fn record(kind: &str) -> EventRecord {
        EventRecord::new(
            AggregateType::Area,
            AggregateId::new(),
            1,
            NewEvent::new(kind, json!({}), Utc::now()),
        )
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> EventHandler {
        let log = log.clone();
        Arc::new(move |_record: &EventRecord| -> Result<(), ProjectionError> {
            log.lock().unwrap().push(name.to_string());
            Ok(())
        })
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = SubscriptionTable::builder();
        builder
            .subscribe("assets.area.created", "first", recorder(&log, "first"))
            .subscribe_all("audit", recorder(&log, "audit"))
            .subscribe("assets.area.created", "second", recorder(&log, "second"));
        let bus = InMemoryEventBus::new(Arc::new(builder.build()));

        let report = bus.publish(&record("assets.area.created"));

        assert!(report.is_clean());
        assert_eq!(report.delivered, 3);
        assert_eq!(*log.lock().unwrap(), vec!["first", "audit", "second"]);
    }

    #[test]
    fn unsubscribed_kinds_only_reach_wildcards() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = SubscriptionTable::builder();
        builder
            .subscribe("assets.area.created", "area", recorder(&log, "area"))
            .subscribe_all("audit", recorder(&log, "audit"));
        let bus = InMemoryEventBus::new(Arc::new(builder.build()));

        bus.publish(&record("tasks.task.created"));

        assert_eq!(*log.lock().unwrap(), vec!["audit"]);
        assert_eq!(bus.table().handlers_for("tasks.task.created"), vec!["audit"]);
    }

    #[test]
    fn failing_handler_is_reported_and_does_not_stop_delivery() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let failing: EventHandler = Arc::new(|r: &EventRecord| {
            Err(ProjectionError::Storage(format!("boom on {}", r.kind())))
        });
        let mut builder = SubscriptionTable::builder();
        builder
            .subscribe("assets.area.removed", "broken", failing)
            .subscribe("assets.area.removed", "healthy", recorder(&log, "healthy"));
        let bus = InMemoryEventBus::new(Arc::new(builder.build()));

        let report = bus.publish(&record("assets.area.removed"));

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].handler_id, "broken");
        assert_eq!(*log.lock().unwrap(), vec!["healthy"]);
    }
}
