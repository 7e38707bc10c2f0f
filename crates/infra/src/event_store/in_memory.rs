use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tania_core::{AggregateId, AggregateType, ExpectedVersion};
use tania_events::{EventRecord, NewEvent};

use super::r#trait::{Committed, EventStore, EventStoreError, EventStream};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    aggregate_type: AggregateType,
    aggregate_id: AggregateId,
}

type Stream = Arc<Mutex<Vec<EventRecord>>>;

/// In-memory append-only event store.
///
/// Every stream has its own mutex; the map lock is only held long enough to find
/// (or create) a stream, so appends to different aggregates never wait on each other.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamKey, Stream>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn existing_stream(&self, key: &StreamKey) -> Result<Option<Stream>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::Storage("stream map lock poisoned".to_string()))?;
        Ok(streams.get(key).cloned())
    }

    fn stream_for_append(&self, key: StreamKey) -> Result<Stream, EventStoreError> {
        if let Some(stream) = self.existing_stream(&key)? {
            return Ok(stream);
        }
        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::Storage("stream map lock poisoned".to_string()))?;
        Ok(streams.entry(key).or_default().clone())
    }

    fn current_version(stream: &[EventRecord]) -> u64 {
        stream.last().map(EventRecord::sequence).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: AggregateId,
        expected: ExpectedVersion,
        events: Vec<NewEvent>,
    ) -> Result<Committed, EventStoreError> {
        let key = StreamKey {
            aggregate_type,
            aggregate_id,
        };

        if events.is_empty() {
            let version = match self.existing_stream(&key)? {
                Some(stream) => {
                    let stream = stream
                        .lock()
                        .map_err(|_| EventStoreError::Storage("stream lock poisoned".to_string()))?;
                    Self::current_version(&stream)
                }
                None => 0,
            };
            return Ok(Committed {
                version,
                records: vec![],
            });
        }

        let stream = self.stream_for_append(key)?;
        let mut stream = stream
            .lock()
            .map_err(|_| EventStoreError::Storage("stream lock poisoned".to_string()))?;

        let current = Self::current_version(&stream);
        if !expected.matches(current) {
            return Err(EventStoreError::Conflict(format!(
                "{aggregate_type} {aggregate_id}: expected {expected:?}, found {current}"
            )));
        }

        // Assign sequence numbers and append (append-only).
        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for event in events {
            committed.push(EventRecord::new(aggregate_type, aggregate_id, next, event));
            next += 1;
        }
        stream.extend(committed.iter().cloned());

        Ok(Committed {
            version: next - 1,
            records: committed,
        })
    }

    fn events_of(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: AggregateId,
    ) -> Result<EventStream, EventStoreError> {
        let key = StreamKey {
            aggregate_type,
            aggregate_id,
        };
        let records = match self.existing_stream(&key)? {
            Some(stream) => stream
                .lock()
                .map_err(|_| EventStoreError::Storage("stream lock poisoned".to_string()))?
                .clone(),
            None => Vec::new(),
        };
        Ok(EventStream::new(aggregate_type, aggregate_id, records))
    }

    fn all_events(&self, aggregate_type: AggregateType) -> Result<Vec<EventRecord>, EventStoreError> {
        let mut streams: Vec<(AggregateId, Stream)> = {
            let map = self
                .streams
                .read()
                .map_err(|_| EventStoreError::Storage("stream map lock poisoned".to_string()))?;
            map.iter()
                .filter(|(key, _)| key.aggregate_type == aggregate_type)
                .map(|(key, stream)| (key.aggregate_id, stream.clone()))
                .collect()
        };
        streams.sort_by_key(|(id, _)| *id);

        let mut records = Vec::new();
        for (_, stream) in streams {
            let stream = stream
                .lock()
                .map_err(|_| EventStoreError::Storage("stream lock poisoned".to_string()))?;
            records.extend(stream.iter().cloned());
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use chrono::Utc;
    use serde_json::json;

    use super::*;

    fn event(kind: &str) -> NewEvent {
        NewEvent::new(kind, json!({ "n": kind }), Utc::now())
    }

    #[test]
    fn batch_for_new_aggregate_gets_sequences_one_to_three() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        let committed = store
            .append(
                AggregateType::Area,
                id,
                ExpectedVersion::Exact(0),
                vec![event("a"), event("b"), event("c")],
            )
            .unwrap();

        assert_eq!(committed.version, 3);
        let seqs: Vec<u64> = committed.records.iter().map(|r| r.sequence()).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        let kinds: Vec<&str> = committed.records.iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, vec!["a", "b", "c"]);
    }

    #[test]
    fn stale_expected_version_is_a_conflict_and_leaves_the_log_unchanged() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(AggregateType::Farm, id, ExpectedVersion::Exact(0), vec![event("a")])
            .unwrap();

        let err = store
            .append(AggregateType::Farm, id, ExpectedVersion::Exact(0), vec![event("b")])
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Conflict(_)));

        let stream = store.events_of(AggregateType::Farm, id).unwrap();
        assert_eq!(stream.len(), 1);
        assert_eq!(stream.version(), 1);
    }

    #[test]
    fn empty_batch_reports_current_version() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(AggregateType::Task, id, ExpectedVersion::Any, vec![event("a"), event("b")])
            .unwrap();

        let committed = store
            .append(AggregateType::Task, id, ExpectedVersion::Exact(99), vec![])
            .unwrap();
        assert_eq!(committed.version, 2);
        assert!(committed.records.is_empty());
    }

    #[test]
    fn streams_are_partitioned_by_aggregate_type() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(AggregateType::Area, id, ExpectedVersion::Exact(0), vec![event("a")])
            .unwrap();

        assert!(store.events_of(AggregateType::Crop, id).unwrap().is_empty());
        assert!(store.all_events(AggregateType::Crop).unwrap().is_empty());
    }

    #[test]
    fn event_stream_snapshot_is_restartable() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(AggregateType::Area, id, ExpectedVersion::Any, vec![event("a"), event("b")])
            .unwrap();

        let stream = store.events_of(AggregateType::Area, id).unwrap();
        store
            .append(AggregateType::Area, id, ExpectedVersion::Any, vec![event("c")])
            .unwrap();

        let first: Vec<u64> = stream.iter().map(|r| r.sequence()).collect();
        let second: Vec<u64> = (&stream).into_iter().map(|r| r.sequence()).collect();
        assert_eq!(first, vec![1, 2]);
        assert_eq!(first, second);
    }

    #[test]
    fn all_events_are_ordered_by_aggregate_then_sequence() {
        let store = InMemoryEventStore::new();
        let ids: Vec<AggregateId> = (0..4).map(|_| AggregateId::new()).collect();
        for id in ids.iter().rev() {
            store
                .append(AggregateType::Material, *id, ExpectedVersion::Any, vec![event("a"), event("b")])
                .unwrap();
        }

        let all = store.all_events(AggregateType::Material).unwrap();
        assert_eq!(all.len(), 8);
        let keys: Vec<(AggregateId, u64)> =
            all.iter().map(|r| (r.aggregate_id(), r.sequence())).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn concurrent_appends_with_same_expected_version_have_one_winner() {
        let store = Arc::new(InMemoryEventStore::new());
        let id = AggregateId::new();
        store
            .append(AggregateType::Crop, id, ExpectedVersion::Exact(0), vec![event("created")])
            .unwrap();

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    store.append(
                        AggregateType::Crop,
                        id,
                        ExpectedVersion::Exact(1),
                        vec![event("watered")],
                    )
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(EventStoreError::Conflict(_))))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(store.events_of(AggregateType::Crop, id).unwrap().version(), 2);
    }
}
