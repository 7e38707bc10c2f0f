//! Aggregate repository (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate stream from the event store
//!   ↓
//! 2. Validate it (gap-free from 1, right aggregate) and fold it
//!   ↓
//! 3. Handle the command (pure decision logic, produces events)
//!   ↓
//! 4. Append with the loaded version as expectation (optimistic concurrency)
//!   ↓
//! 5. Publish each committed record, in order, on the bus
//! ```
//!
//! Invariants are always checked against replayed state, never against a read model.
//! A `Conflict` is surfaced to the caller and never retried here.
//!
//! Steps 4 and 5 run under a shared gate. [`Repository::pause_saves`] takes it
//! exclusively, so a rebuild never interleaves with live deliveries from this process.

use std::sync::{Arc, RwLock, RwLockWriteGuard};

use thiserror::Error;
use tracing::{debug, error, instrument};

use tania_core::{Aggregate, AggregateId, AggregateType, DomainError, ExpectedVersion};
use tania_events::{DomainEvent, EventBus, EventCodecError, EventRecord, NewEvent, PublishReport};

use crate::event_store::{EventStore, EventStoreError, EventStream};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("{aggregate_type} {aggregate_id} not found")]
    NotFound {
        aggregate_type: AggregateType,
        aggregate_id: AggregateId,
    },

    /// Optimistic concurrency failure (stale expected version).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The aggregate rejected the command.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The stored stream violates the log invariants.
    #[error("corrupt stream for {aggregate_id}: {message}")]
    Corrupt {
        aggregate_id: AggregateId,
        message: String,
    },

    #[error("event codec failure: {0}")]
    Decode(#[from] EventCodecError),

    #[error(transparent)]
    Store(EventStoreError),
}

impl From<EventStoreError> for RepositoryError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Conflict(msg) => RepositoryError::Conflict(msg),
            other => RepositoryError::Store(other),
        }
    }
}

/// Result of a successful `execute`/`create`.
#[derive(Debug, Clone)]
pub struct Executed<A> {
    /// State after folding the new events.
    pub state: A,
    /// Committed records, in sequence order.
    pub records: Vec<EventRecord>,
    pub report: PublishReport,
}

impl<A: Aggregate> Executed<A> {
    pub fn version(&self) -> u64 {
        self.state.version()
    }
}

/// Loads aggregates by replay and persists their decisions.
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn EventStore>,
    bus: Arc<dyn EventBus>,
    saves: Arc<RwLock<()>>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").finish_non_exhaustive()
    }
}

impl Repository {
    pub fn new(store: Arc<dyn EventStore>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            store,
            bus,
            saves: Arc::new(RwLock::new(())),
        }
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Block every save (append and publish) until the guard is dropped. Saves already
    /// in flight finish first.
    pub fn pause_saves(&self) -> Result<RwLockWriteGuard<'_, ()>, RepositoryError> {
        self.saves.write().map_err(|_| gate_poisoned())
    }

    /// Replay an aggregate; `NotFound` when the stream is empty.
    pub fn load<A>(&self, id: AggregateId) -> Result<(A, u64), RepositoryError>
    where
        A: Aggregate,
        A::Event: DomainEvent,
    {
        let state: A = self.replay(id)?;
        if !state.exists() {
            return Err(RepositoryError::NotFound {
                aggregate_type: A::TYPE,
                aggregate_id: id,
            });
        }
        let version = state.version();
        Ok((state, version))
    }

    /// Replay an aggregate from its (possibly empty) stream.
    #[instrument(skip(self, id), fields(aggregate_type = %A::TYPE, aggregate_id = %id), err)]
    pub fn replay<A>(&self, id: AggregateId) -> Result<A, RepositoryError>
    where
        A: Aggregate,
        A::Event: DomainEvent,
    {
        let stream = self.store.events_of(A::TYPE, id)?;
        validate_stream(A::TYPE, id, &stream)?;

        let mut state = A::initial(id);
        for record in &stream {
            let event: A::Event = record.decode()?;
            state.apply(&event);
        }
        Ok(state)
    }

    /// Append decided events and publish the committed records.
    #[instrument(
        skip(self, id, events),
        fields(aggregate_type = %A::TYPE, aggregate_id = %id, event_count = events.len()),
        err
    )]
    pub fn save<A>(
        &self,
        id: AggregateId,
        events: &[A::Event],
        expected: ExpectedVersion,
    ) -> Result<(Vec<EventRecord>, PublishReport), RepositoryError>
    where
        A: Aggregate,
        A::Event: DomainEvent,
    {
        let new_events = events
            .iter()
            .map(NewEvent::from_domain)
            .collect::<Result<Vec<_>, _>>()?;

        let _saving = self.saves.read().map_err(|_| gate_poisoned())?;
        let committed = self.store.append(A::TYPE, id, expected, new_events)?;
        debug!(version = committed.version, "events committed");

        let mut report = PublishReport::default();
        for record in &committed.records {
            report.merge(self.bus.publish(record));
        }
        if !report.is_clean() {
            error!(
                failures = report.failures.len(),
                "read models lag behind the log until rebuilt"
            );
        }
        Ok((committed.records, report))
    }

    /// Load, decide and save with the loaded version as expectation.
    pub fn execute<A>(&self, id: AggregateId, command: &A::Command) -> Result<Executed<A>, RepositoryError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: DomainEvent,
    {
        let (state, version) = self.load::<A>(id)?;
        self.decide_and_save(id, state, version, command)
    }

    /// Decide on an aggregate that must not exist yet (expected version 0).
    pub fn create<A>(&self, id: AggregateId, command: &A::Command) -> Result<Executed<A>, RepositoryError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: DomainEvent,
    {
        let state: A = self.replay(id)?;
        if state.exists() {
            return Err(RepositoryError::Conflict(format!(
                "{} {id} already exists",
                A::TYPE
            )));
        }
        self.decide_and_save(id, state, 0, command)
    }

    fn decide_and_save<A>(
        &self,
        id: AggregateId,
        mut state: A,
        version: u64,
        command: &A::Command,
    ) -> Result<Executed<A>, RepositoryError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: DomainEvent,
    {
        let decided = state.handle(command)?;
        if decided.is_empty() {
            return Ok(Executed {
                state,
                records: vec![],
                report: PublishReport::default(),
            });
        }

        let (records, report) = self.save::<A>(id, &decided, ExpectedVersion::Exact(version))?;
        for event in &decided {
            state.apply(event);
        }
        Ok(Executed {
            state,
            records,
            report,
        })
    }
}

fn gate_poisoned() -> RepositoryError {
    RepositoryError::Store(EventStoreError::Storage("save gate poisoned".to_string()))
}

/// A stream must belong to the aggregate and run gap-free from sequence 1.
fn validate_stream(
    aggregate_type: AggregateType,
    aggregate_id: AggregateId,
    stream: &EventStream,
) -> Result<(), RepositoryError> {
    for (idx, record) in stream.iter().enumerate() {
        let expected_sequence = idx as u64 + 1;
        if record.aggregate_id() != aggregate_id || record.aggregate_type() != aggregate_type {
            return Err(RepositoryError::Corrupt {
                aggregate_id,
                message: format!(
                    "record at index {idx} belongs to {} {}",
                    record.aggregate_type(),
                    record.aggregate_id()
                ),
            });
        }
        if record.sequence() != expected_sequence {
            return Err(RepositoryError::Corrupt {
                aggregate_id,
                message: format!(
                    "expected sequence {expected_sequence}, found {}",
                    record.sequence()
                ),
            });
        }
    }
    Ok(())
}
