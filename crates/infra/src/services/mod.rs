//! Command and query surface, one service per bounded context.
//!
//! ```text
//! service call
//!   ↓
//! 1. Replay the aggregates the command depends on (links, uniqueness)
//!   ↓
//! 2. Repository: load → handle → append → publish
//!   ↓
//! 3. Read the updated row back from the context's own view
//! ```
//!
//! Business rules are always decided on replayed state. Views are only read to
//! answer queries and to return the row a command produced.

use thiserror::Error;
use tracing::warn;

use tania_core::{AggregateId, DomainError};
use tania_events::PublishReport;

use crate::read_model::{ReadStore, ReadStoreError};
use crate::repository::RepositoryError;

pub mod assets;
pub mod growth;
pub mod tasks;
pub mod user;

pub use assets::{AssetsService, CreateAreaRequest};
pub use growth::{GrowthService, MoveCropRequest, PlantCropRequest};
pub use tasks::{CreateTaskRequest, TasksService};
pub use user::UserService;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Stale expected version or an aggregate that already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The command broke a business rule.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage failure: {0}")]
    Storage(String),

    /// A stored stream could not be replayed.
    #[error("corrupt stream: {0}")]
    Corrupt(String),

    /// The events were committed but a view could not apply them (rebuild repairs it).
    #[error("committed, but read models lag behind: {0}")]
    Projection(String),
}

impl From<DomainError> for CommandError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg)
            | DomainError::InvariantViolation(msg)
            | DomainError::InvalidId(msg) => CommandError::Validation(msg),
            DomainError::NotFound => CommandError::NotFound("aggregate".into()),
            DomainError::Conflict(msg) => CommandError::Conflict(msg),
        }
    }
}

impl From<RepositoryError> for CommandError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound {
                aggregate_type,
                aggregate_id,
            } => CommandError::NotFound(format!("{aggregate_type} {aggregate_id}")),
            RepositoryError::Conflict(msg) => CommandError::Conflict(msg),
            RepositoryError::Domain(err) => err.into(),
            err @ (RepositoryError::Corrupt { .. } | RepositoryError::Decode(_)) => {
                CommandError::Corrupt(err.to_string())
            }
            RepositoryError::Store(err) => CommandError::Storage(err.to_string()),
        }
    }
}

impl From<ReadStoreError> for CommandError {
    fn from(value: ReadStoreError) -> Self {
        match value {
            ReadStoreError::NotFound { view, id } => CommandError::NotFound(format!("{view} row {id}")),
            ReadStoreError::Storage(msg) => CommandError::Storage(msg),
        }
    }
}

/// Row produced by a committed command.
pub(crate) fn committed_row<V>(
    view: &ReadStore<V>,
    id: AggregateId,
    report: &PublishReport,
) -> Result<V, CommandError>
where
    V: Clone + Send + Sync + 'static,
{
    ensure_projected(view.view(), id, report)?;
    Ok(view.find(id)?)
}

/// Fails with `Projection` when any handler rejected the committed events.
pub(crate) fn ensure_projected(
    view: &str,
    id: AggregateId,
    report: &PublishReport,
) -> Result<(), CommandError> {
    if report.is_clean() {
        return Ok(());
    }
    let failures = report
        .failures
        .iter()
        .map(|f| format!("{}: {}", f.handler_id, f.error))
        .collect::<Vec<_>>()
        .join("; ");
    warn!(view, aggregate_id = %id, %failures, "command committed with projection failures");
    Err(CommandError::Projection(failures))
}

#[cfg(test)]
mod tests {
    use tania_core::AggregateType;

    use super::*;
    use crate::event_store::EventStoreError;

    #[test]
    fn repository_errors_map_onto_the_command_surface() {
        let id = AggregateId::new();
        assert!(matches!(
            CommandError::from(RepositoryError::NotFound {
                aggregate_type: AggregateType::Area,
                aggregate_id: id,
            }),
            CommandError::NotFound(msg) if msg.starts_with("area ")
        ));
        assert_eq!(
            CommandError::from(RepositoryError::Domain(DomainError::invariant("seeding only"))),
            CommandError::Validation("seeding only".into())
        );
        assert_eq!(
            CommandError::from(RepositoryError::from(EventStoreError::Conflict("v1".into()))),
            CommandError::Conflict("v1".into())
        );
        assert!(matches!(
            CommandError::from(RepositoryError::Store(EventStoreError::Storage("io".into()))),
            CommandError::Storage(_)
        ));
    }
}
