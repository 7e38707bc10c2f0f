//! Aggregate root traits for event-sourced domain models.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::AggregateId;

/// Every aggregate type persisted by the farm backend.
///
/// The event store partitions its logs by this tag, so the string form is part of the
/// durable format and must never change once events exist.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateType {
    Farm,
    Area,
    Reservoir,
    Material,
    Crop,
    Task,
    User,
}

impl AggregateType {
    pub const ALL: [AggregateType; 7] = [
        AggregateType::Farm,
        AggregateType::Area,
        AggregateType::Reservoir,
        AggregateType::Material,
        AggregateType::Crop,
        AggregateType::Task,
        AggregateType::User,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AggregateType::Farm => "farm",
            AggregateType::Area => "area",
            AggregateType::Reservoir => "reservoir",
            AggregateType::Material => "material",
            AggregateType::Crop => "crop",
            AggregateType::Task => "task",
            AggregateType::User => "user",
        }
    }
}

impl core::fmt::Display for AggregateType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AggregateType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown aggregate type '{s}'")))
    }
}

/// Aggregate root marker + minimal interface.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Number of events folded into this state (the stream revision).
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for an aggregate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (migrations, imports).
    Any,
    /// Require the aggregate to be at an exact version (0 = stream must not exist).
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

/// Aggregate execution semantics (pure, deterministic).
///
/// - **Initial state**: `initial(id)` is the state before any event.
/// - **Decision logic**: `handle(&self, cmd)` returns events.
/// - **Fold**: `apply(&mut self, event)` evolves state; it must be total over
///   `Self::Event` and free of side effects so replay always yields the same state.
///
/// Aggregates must not perform IO. Checks that need another aggregate's state take
/// that state (replayed by the caller) as part of the command.
pub trait Aggregate: AggregateRoot + Sized {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Aggregate type tag used to partition the event store.
    const TYPE: AggregateType;

    /// Empty, not-yet-created instance used as the starting point of a replay.
    fn initial(id: AggregateId) -> Self;

    /// Evolve in-memory state from a single event (+1 version per event).
    fn apply(&mut self, event: &Self::Event);

    /// Decide which events to emit given the current state and a command.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Whether the stream has been started (a creation event was folded).
    fn exists(&self) -> bool {
        self.version() > 0
    }
}

/// Fold a sequence of events from the initial state.
pub fn fold<'a, A>(id: AggregateId, events: impl IntoIterator<Item = &'a A::Event>) -> A
where
    A: Aggregate,
    A::Event: 'a,
{
    let mut state = A::initial(id);
    for event in events {
        state.apply(event);
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_type_round_trips_through_strings() {
        for t in AggregateType::ALL {
            assert_eq!(t.as_str().parse::<AggregateType>().unwrap(), t);
        }
        assert!("barn".parse::<AggregateType>().is_err());
    }

    #[test]
    fn expected_version_exact_rejects_other_versions() {
        assert!(ExpectedVersion::Exact(2).matches(2));
        assert!(!ExpectedVersion::Exact(2).matches(3));
        assert!(ExpectedVersion::Any.matches(42));
        assert!(matches!(
            ExpectedVersion::Exact(0).check(1),
            Err(DomainError::Conflict(_))
        ));
    }
}
