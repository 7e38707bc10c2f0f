//! Reference mirrors: a consuming context's own view of the foreign aggregates its
//! rows point at.
//!
//! Mirrors are projected from the integration kinds only (see
//! `tania_events::integration`), so a consumer never decodes a producer's private
//! payloads. Row projectors read the mirror when they write a row; foreign projectors
//! patch existing rows from the mirror's current state when it changes, so a
//! re-delivered or late integration event never rolls a row back. A rebuild
//! (mirror first) reproduces the live rows.

use serde::{Deserialize, Serialize};

use tania_core::{AggregateId, AggregateType};
use tania_events::integration::{ReferenceFact, reference_fact};
use tania_events::{EventRecord, ProjectionError, Projector, RowChange};

use crate::read_model::{ReadStore, ReadStoreError};

/// A foreign aggregate as seen by the consuming context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRow {
    pub id: AggregateId,
    pub kind: AggregateType,
    /// Display name (batch id for crops).
    pub name: String,
    pub retired: bool,
}

/// Maintains a mirror for a fixed set of source aggregate types.
#[derive(Debug, Clone)]
pub struct ReferenceProjector {
    sources: Vec<AggregateType>,
}

impl ReferenceProjector {
    pub fn new(sources: impl IntoIterator<Item = AggregateType>) -> Self {
        Self {
            sources: sources.into_iter().collect(),
        }
    }
}

impl Projector<ReferenceRow> for ReferenceProjector {
    fn sources(&self) -> &[AggregateType] {
        &self.sources
    }

    fn project(
        &self,
        current: Option<&ReferenceRow>,
        record: &EventRecord,
    ) -> Result<RowChange<ReferenceRow>, ProjectionError> {
        let Some(fact) = reference_fact(record)? else {
            return Ok(RowChange::Unchanged);
        };

        match (fact, current) {
            (ReferenceFact::Created { name }, _) => Ok(RowChange::Upsert(ReferenceRow {
                id: record.aggregate_id(),
                kind: record.aggregate_type(),
                name,
                retired: false,
            })),
            (ReferenceFact::Renamed { name }, Some(row)) => Ok(RowChange::Upsert(ReferenceRow {
                name,
                ..row.clone()
            })),
            (ReferenceFact::Retired, Some(row)) => Ok(RowChange::Upsert(ReferenceRow {
                retired: true,
                ..row.clone()
            })),
            (_, None) => Err(super::missing_row(record)),
        }
    }
}

/// Look up a mirrored aggregate; `None` when it has not been seen yet.
pub fn lookup(
    mirror: &ReadStore<ReferenceRow>,
    id: AggregateId,
) -> Result<Option<ReferenceRow>, ProjectionError> {
    match mirror.find(id) {
        Ok(row) => Ok(Some(row)),
        Err(ReadStoreError::NotFound { .. }) => Ok(None),
        Err(err) => Err(ProjectionError::Storage(err.to_string())),
    }
}

/// Mirror row of the aggregate `record` belongs to, read after the mirror applied it.
///
/// `None` for records outside the mirror's sources, for kinds that are not
/// integration events, and for aggregates the mirror has not seen.
pub fn mirrored(
    mirror: &ReadStore<ReferenceRow>,
    record: &EventRecord,
) -> Result<Option<ReferenceRow>, ProjectionError> {
    if !mirror.sources().contains(&record.aggregate_type()) {
        return Ok(None);
    }
    if reference_fact(record)?.is_none() {
        return Ok(None);
    }
    lookup(mirror, record.aggregate_id())
}
