use std::sync::Arc;

use tracing::{debug, info, warn};

use tania_core::{AggregateId, AggregateType};
use tania_events::{EventRecord, ForeignProjector, ProjectionError, Projector, RowChange};

use super::{ReadStoreError, RowStore, StoredRow};
use crate::event_store::EventStore;

/// What `apply` did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The record advanced the row's high-water-mark.
    Advanced,
    /// The record was at or below the high-water-mark (re-delivery).
    Duplicate,
}

/// Outcome of a rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub events: usize,
    pub rows: usize,
    /// Records the projector rejected; their rows are left flagged stale.
    pub failures: usize,
}

/// A view's rows together with the projector that maintains them.
///
/// - `apply` is idempotent: every row remembers the sequence of the last event folded
///   into it, so re-delivered records are ignored.
/// - A record that skips ahead (`sequence > last + 1`) is refused with
///   [`ProjectionError::SequenceGap`] and the row is flagged `possibly_stale`.
/// - `rebuild` clears the rows and replays every source stream.
pub struct ReadStore<V> {
    view: &'static str,
    rows: Arc<dyn RowStore<V>>,
    projector: Arc<dyn Projector<V>>,
}

impl<V> Clone for ReadStore<V> {
    fn clone(&self) -> Self {
        Self {
            view: self.view,
            rows: self.rows.clone(),
            projector: self.projector.clone(),
        }
    }
}

impl<V> std::fmt::Debug for ReadStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadStore")
            .field("view", &self.view)
            .field("sources", &self.projector.sources())
            .finish_non_exhaustive()
    }
}

impl<V> ReadStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        view: &'static str,
        rows: Arc<dyn RowStore<V>>,
        projector: Arc<dyn Projector<V>>,
    ) -> Self {
        Self {
            view,
            rows,
            projector,
        }
    }

    pub fn view(&self) -> &'static str {
        self.view
    }

    pub fn sources(&self) -> &[AggregateType] {
        self.projector.sources()
    }

    pub fn consumes(&self, record: &EventRecord) -> bool {
        self.sources().contains(&record.aggregate_type())
    }

    pub fn find(&self, id: AggregateId) -> Result<V, ReadStoreError> {
        self.rows
            .get(id)?
            .and_then(|stored| stored.row)
            .ok_or(ReadStoreError::NotFound {
                view: self.view,
                id,
            })
    }

    pub fn find_by(&self, predicate: impl Fn(&V) -> bool) -> Result<Vec<V>, ReadStoreError> {
        Ok(self
            .rows
            .all()?
            .into_iter()
            .filter_map(|(_, stored)| stored.row)
            .filter(|row| predicate(row))
            .collect())
    }

    pub fn all(&self) -> Result<Vec<V>, ReadStoreError> {
        self.find_by(|_| true)
    }

    pub fn count(&self) -> Result<usize, ReadStoreError> {
        Ok(self.all()?.len())
    }

    /// Rows (tombstones included) flagged as possibly stale.
    pub fn stale_ids(&self) -> Result<Vec<AggregateId>, ReadStoreError> {
        Ok(self
            .rows
            .all()?
            .into_iter()
            .filter(|(_, stored)| stored.possibly_stale)
            .map(|(id, _)| id)
            .collect())
    }

    /// Raw stored rows, bookkeeping included.
    pub fn stored_rows(&self) -> Result<Vec<(AggregateId, StoredRow<V>)>, ReadStoreError> {
        self.rows.all()
    }

    /// Fold one record into the row of its aggregate.
    pub fn apply(&self, record: &EventRecord) -> Result<Applied, ProjectionError> {
        if !self.consumes(record) {
            return Err(ProjectionError::UnexpectedSource(record.aggregate_type()));
        }

        let id = record.aggregate_id();
        let sequence = record.sequence();
        let mut outcome: Result<Applied, ProjectionError> = Ok(Applied::Duplicate);

        self.rows
            .modify(id, &mut |slot| {
                let last = slot.as_ref().map(|s| s.last_applied_sequence).unwrap_or(0);
                let stale = slot.as_ref().is_some_and(|s| s.possibly_stale);

                if sequence <= last {
                    outcome = Ok(Applied::Duplicate);
                    return false;
                }

                if sequence > last + 1 {
                    outcome = Err(ProjectionError::SequenceGap {
                        aggregate_id: id,
                        last,
                        found: sequence,
                    });
                    return mark_stale(slot, last);
                }

                let current = slot.as_ref().and_then(|s| s.row.as_ref());
                match self.projector.project(current, record) {
                    Ok(change) => {
                        let row = match change {
                            RowChange::Upsert(row) => Some(row),
                            RowChange::Remove => None,
                            RowChange::Unchanged => current.cloned(),
                        };
                        *slot = Some(StoredRow {
                            row,
                            last_applied_sequence: sequence,
                            possibly_stale: stale,
                        });
                        outcome = Ok(Applied::Advanced);
                        true
                    }
                    Err(err) => {
                        outcome = Err(err);
                        mark_stale(slot, last)
                    }
                }
            })
            .map_err(|e| ProjectionError::Storage(e.to_string()))?;

        match &outcome {
            Ok(Applied::Duplicate) => debug!(
                view = self.view,
                aggregate_id = %id,
                sequence,
                "duplicate delivery ignored"
            ),
            Err(err) => warn!(
                view = self.view,
                aggregate_id = %id,
                sequence,
                error = %err,
                "row flagged possibly stale"
            ),
            Ok(Applied::Advanced) => {}
        }
        outcome
    }

    /// Let a foreign event update the rows that reference its aggregate.
    ///
    /// High-water-marks are left untouched. Returns the number of rows changed.
    pub fn apply_foreign<P>(&self, record: &EventRecord, projector: &P) -> Result<usize, ProjectionError>
    where
        P: ForeignProjector<V> + ?Sized,
    {
        let Some(fact) = projector.interpret(record)? else {
            return Ok(0);
        };

        let candidates = self
            .rows
            .all()
            .map_err(|e| ProjectionError::Storage(e.to_string()))?;

        let mut changed = 0;
        for (id, stored) in candidates {
            let Some(row) = stored.row.as_ref() else {
                continue;
            };
            if matches!(projector.project(row, &fact), RowChange::Unchanged) {
                continue;
            }

            // Re-run under the row lock: the row may have moved on since the scan.
            self.rows
                .modify(id, &mut |slot| {
                    let Some(stored) = slot.as_mut() else {
                        return false;
                    };
                    let Some(row) = stored.row.as_ref() else {
                        return false;
                    };
                    match projector.project(row, &fact) {
                        RowChange::Upsert(next) => {
                            stored.row = Some(next);
                            changed += 1;
                            true
                        }
                        RowChange::Remove => {
                            stored.row = None;
                            changed += 1;
                            true
                        }
                        RowChange::Unchanged => false,
                    }
                })
                .map_err(|e| ProjectionError::Storage(e.to_string()))?;
        }

        if changed > 0 {
            debug!(
                view = self.view,
                source = %record.aggregate_id(),
                kind = record.kind(),
                changed,
                "foreign event applied"
            );
        }
        Ok(changed)
    }

    /// Clear every row and replay the source streams from sequence 1.
    ///
    /// Not safe beside live `apply` calls on the same view: a record delivered between
    /// the clear and the replay of its aggregate lands on an empty row and is flagged
    /// as a gap. `Tania::rebuild_read_models` pauses saves for the duration.
    pub fn rebuild(&self, events: &dyn EventStore) -> Result<RebuildStats, ProjectionError> {
        self.rows
            .clear()
            .map_err(|e| ProjectionError::Storage(e.to_string()))?;

        let mut stats = RebuildStats::default();
        for source in self.projector.sources() {
            let records = events
                .all_events(*source)
                .map_err(|e| ProjectionError::Storage(e.to_string()))?;
            for record in &records {
                stats.events += 1;
                match self.apply(record) {
                    Ok(_) => {}
                    Err(ProjectionError::Storage(msg)) => return Err(ProjectionError::Storage(msg)),
                    Err(_) => stats.failures += 1,
                }
            }
        }

        stats.rows = self.count().map_err(|e| ProjectionError::Storage(e.to_string()))?;
        info!(
            view = self.view,
            events = stats.events,
            rows = stats.rows,
            failures = stats.failures,
            "read model rebuilt"
        );
        Ok(stats)
    }
}

fn mark_stale<V>(slot: &mut Option<StoredRow<V>>, last: u64) -> bool {
    match slot {
        Some(stored) if stored.possibly_stale => false,
        Some(stored) => {
            stored.possibly_stale = true;
            true
        }
        None => {
            *slot = Some(StoredRow {
                row: None,
                last_applied_sequence: last,
                possibly_stale: true,
            });
            true
        }
    }
}

/// Object-safe handle used to maintain every view uniformly.
pub trait ManagedView: Send + Sync {
    fn view(&self) -> &'static str;
    fn stale_ids(&self) -> Result<Vec<AggregateId>, ReadStoreError>;
    fn rebuild(&self, events: &dyn EventStore) -> Result<RebuildStats, ProjectionError>;
}

impl<V> ManagedView for ReadStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn view(&self) -> &'static str {
        ReadStore::view(self)
    }

    fn stale_ids(&self) -> Result<Vec<AggregateId>, ReadStoreError> {
        ReadStore::stale_ids(self)
    }

    fn rebuild(&self, events: &dyn EventStore) -> Result<RebuildStats, ProjectionError> {
        ReadStore::rebuild(self, events)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use tania_core::ExpectedVersion;
    use tania_events::NewEvent;

    use super::*;
    use crate::event_store::InMemoryEventStore;
    use crate::read_model::InMemoryRowStore;

    /// Counts events per aggregate and remembers the last kind.
    struct CountingProjector;

    #[derive(Debug, Clone, PartialEq)]
    struct Counted {
        events: u64,
        last_kind: String,
    }

    impl Projector<Counted> for CountingProjector {
        fn sources(&self) -> &[AggregateType] {
            &[AggregateType::Area]
        }

        fn project(
            &self,
            current: Option<&Counted>,
            record: &EventRecord,
        ) -> Result<RowChange<Counted>, ProjectionError> {
            match record.kind() {
                "removed" => Ok(RowChange::Remove),
                "broken" => Err(ProjectionError::Inconsistent {
                    aggregate_id: record.aggregate_id(),
                    message: "cannot apply".into(),
                }),
                kind => Ok(RowChange::Upsert(Counted {
                    events: current.map(|c| c.events).unwrap_or(0) + 1,
                    last_kind: kind.to_string(),
                })),
            }
        }
    }

    struct RenameAll;

    impl ForeignProjector<Counted> for RenameAll {
        type Fact = String;

        fn interpret(&self, record: &EventRecord) -> Result<Option<String>, ProjectionError> {
            Ok((record.kind() == "rename").then(|| "renamed".to_string()))
        }

        fn project(&self, row: &Counted, fact: &String) -> RowChange<Counted> {
            if &row.last_kind == fact {
                return RowChange::Unchanged;
            }
            RowChange::Upsert(Counted {
                events: row.events,
                last_kind: fact.clone(),
            })
        }
    }

    fn read_store() -> ReadStore<Counted> {
        ReadStore::new(
            "counted",
            Arc::new(InMemoryRowStore::new()),
            Arc::new(CountingProjector),
        )
    }

    fn record(id: AggregateId, sequence: u64, kind: &str) -> EventRecord {
        EventRecord::new(
            AggregateType::Area,
            id,
            sequence,
            NewEvent::new(kind, json!({}), Utc::now()),
        )
    }

    #[test]
    fn duplicate_delivery_is_a_no_op() {
        let store = read_store();
        let id = AggregateId::new();
        let first = record(id, 1, "created");

        assert_eq!(store.apply(&first).unwrap(), Applied::Advanced);
        let before = store.stored_rows().unwrap();
        assert_eq!(store.apply(&first).unwrap(), Applied::Duplicate);
        assert_eq!(store.stored_rows().unwrap(), before);
        assert_eq!(store.find(id).unwrap().events, 1);
    }

    #[test]
    fn gap_is_refused_and_flags_the_row() {
        let store = read_store();
        let id = AggregateId::new();
        store.apply(&record(id, 1, "created")).unwrap();

        let err = store.apply(&record(id, 3, "renamed")).unwrap_err();
        assert_eq!(
            err,
            ProjectionError::SequenceGap {
                aggregate_id: id,
                last: 1,
                found: 3
            }
        );
        assert_eq!(store.stale_ids().unwrap(), vec![id]);
        assert_eq!(store.find(id).unwrap().events, 1);
    }

    #[test]
    fn projector_failure_flags_the_row_without_advancing() {
        let store = read_store();
        let id = AggregateId::new();
        store.apply(&record(id, 1, "created")).unwrap();

        assert!(store.apply(&record(id, 2, "broken")).is_err());
        let (_, stored) = store.stored_rows().unwrap().remove(0);
        assert_eq!(stored.last_applied_sequence, 1);
        assert!(stored.possibly_stale);
    }

    #[test]
    fn removed_rows_leave_a_tombstone_that_blocks_resurrection() {
        let store = read_store();
        let id = AggregateId::new();
        store.apply(&record(id, 1, "created")).unwrap();
        store.apply(&record(id, 2, "removed")).unwrap();

        assert!(matches!(store.find(id), Err(ReadStoreError::NotFound { .. })));
        assert_eq!(store.apply(&record(id, 1, "created")).unwrap(), Applied::Duplicate);
        assert!(store.find(id).is_err());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn unexpected_source_is_rejected() {
        let store = read_store();
        let crop = EventRecord::new(
            AggregateType::Crop,
            AggregateId::new(),
            1,
            NewEvent::new("created", json!({}), Utc::now()),
        );
        assert_eq!(
            store.apply(&crop).unwrap_err(),
            ProjectionError::UnexpectedSource(AggregateType::Crop)
        );
    }

    #[test]
    fn foreign_updates_keep_high_water_marks() {
        let store = read_store();
        let id = AggregateId::new();
        store.apply(&record(id, 1, "created")).unwrap();

        let foreign = EventRecord::new(
            AggregateType::Farm,
            AggregateId::new(),
            1,
            NewEvent::new("rename", json!({}), Utc::now()),
        );
        assert_eq!(store.apply_foreign(&foreign, &RenameAll).unwrap(), 1);
        assert_eq!(store.apply_foreign(&foreign, &RenameAll).unwrap(), 0);

        let (_, stored) = store.stored_rows().unwrap().remove(0);
        assert_eq!(stored.last_applied_sequence, 1);
        assert_eq!(stored.row.unwrap().last_kind, "renamed");
    }

    #[test]
    fn rebuild_repairs_stale_rows() {
        let events = InMemoryEventStore::new();
        let store = read_store();
        let id = AggregateId::new();

        let committed = events
            .append(
                AggregateType::Area,
                id,
                ExpectedVersion::Exact(0),
                vec![
                    NewEvent::new("created", json!({}), Utc::now()),
                    NewEvent::new("renamed", json!({}), Utc::now()),
                ],
            )
            .unwrap();

        // Only the second record reaches the view.
        assert!(store.apply(&committed.records[1]).is_err());
        assert_eq!(store.stale_ids().unwrap(), vec![id]);

        let stats = store.rebuild(&events).unwrap();
        assert_eq!(stats, RebuildStats { events: 2, rows: 1, failures: 0 });
        assert!(store.stale_ids().unwrap().is_empty());
        assert_eq!(
            store.find(id).unwrap(),
            Counted {
                events: 2,
                last_kind: "renamed".into()
            }
        );
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: any delivery schedule that replays prefixes (at-least-once) ends
            /// in the same rows as a single in-order delivery.
            #[test]
            fn redelivery_converges_to_in_order_result(
                kinds in prop::collection::vec(prop::sample::select(vec!["created", "renamed", "resized"]), 1..12),
                replays in prop::collection::vec(0usize..12, 0..12),
            ) {
                let id = AggregateId::new();
                let records: Vec<EventRecord> = kinds
                    .iter()
                    .enumerate()
                    .map(|(i, k)| record(id, i as u64 + 1, k))
                    .collect();

                let once = read_store();
                for r in &records {
                    once.apply(r).unwrap();
                }

                let noisy = read_store();
                for (i, r) in records.iter().enumerate() {
                    noisy.apply(r).unwrap();
                    for back in &replays {
                        let j = back % (i + 1);
                        prop_assert_eq!(noisy.apply(&records[j]).unwrap(), Applied::Duplicate);
                    }
                }

                prop_assert_eq!(once.stored_rows().unwrap(), noisy.stored_rows().unwrap());
            }
        }
    }
}
