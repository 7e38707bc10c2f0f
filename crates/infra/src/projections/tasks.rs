//! Tasks read model.
//!
//! Task rows show the asset they are attached to (kind and name) and whether that
//! asset has since been removed or archived. Both come from the tasks context's
//! `asset_refs` mirror.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tania_core::{AggregateId, AggregateType};
use tania_events::{EventRecord, ForeignProjector, ProjectionError, Projector, RowChange};
use tania_tasks::{TaskDomain, TaskEvent, TaskId, TaskPriority, TaskStatus};

use super::references::{ReferenceRow, lookup, mirrored};
use super::{decode, missing_row};
use crate::read_model::ReadStore;

/// Aggregate types a task may be attached to.
pub const ASSET_SOURCES: [AggregateType; 4] = [
    AggregateType::Area,
    AggregateType::Reservoir,
    AggregateType::Material,
    AggregateType::Crop,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAsset {
    pub asset_id: AggregateId,
    /// `None` while the asset is unknown to the mirror.
    pub kind: Option<AggregateType>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRow {
    pub task_id: TaskId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub domain: TaskDomain,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub asset: Option<TaskAsset>,
    /// The attached asset was removed (or the crop archived) after assignment.
    pub asset_retired: bool,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl TaskRow {
    pub fn is_open(&self) -> bool {
        self.status == TaskStatus::Created
    }

    /// Open and due before `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.due_date.is_some_and(|due| due < now)
    }
}

/// Maintains `tasks` from task events.
pub struct TaskProjector {
    asset_refs: ReadStore<ReferenceRow>,
}

impl TaskProjector {
    pub fn new(asset_refs: ReadStore<ReferenceRow>) -> Self {
        Self { asset_refs }
    }

    fn resolve_asset(&self, row: &mut TaskRow) -> Result<(), ProjectionError> {
        let Some(asset) = row.asset.as_mut() else {
            return Ok(());
        };
        if let Some(reference) = lookup(&self.asset_refs, asset.asset_id)? {
            asset.kind = Some(reference.kind);
            asset.name = Some(reference.name);
            row.asset_retired = reference.retired;
        }
        Ok(())
    }
}

impl Projector<TaskRow> for TaskProjector {
    fn sources(&self) -> &[AggregateType] {
        &[AggregateType::Task]
    }

    fn project(
        &self,
        current: Option<&TaskRow>,
        record: &EventRecord,
    ) -> Result<RowChange<TaskRow>, ProjectionError> {
        let event: TaskEvent = decode(record)?;

        let mut row = match (event, current) {
            (TaskEvent::Created(e), _) => TaskRow {
                task_id: e.task_id,
                title: e.title,
                description: e.description,
                category: e.category,
                domain: e.domain,
                priority: e.priority,
                due_date: e.due_date,
                asset: e.asset_id.map(|asset_id| TaskAsset {
                    asset_id,
                    kind: None,
                    name: None,
                }),
                asset_retired: false,
                status: TaskStatus::Created,
                created_at: e.occurred_at,
                updated_at: e.occurred_at,
                closed_at: None,
            },
            (_, None) => return Err(missing_row(record)),
            (event, Some(row)) => {
                let mut row = row.clone();
                match event {
                    TaskEvent::Created(_) => {}
                    TaskEvent::TitleChanged(e) => row.title = e.title,
                    TaskEvent::DescriptionChanged(e) => row.description = e.description,
                    TaskEvent::PriorityChanged(e) => row.priority = e.priority,
                    TaskEvent::DueDateChanged(e) => row.due_date = e.due_date,
                    TaskEvent::Completed(e) => {
                        row.status = TaskStatus::Completed;
                        row.closed_at = Some(e.occurred_at);
                    }
                    TaskEvent::Cancelled(e) => {
                        row.status = TaskStatus::Cancelled;
                        row.closed_at = Some(e.occurred_at);
                    }
                }
                row.updated_at = record.occurred_at();
                row
            }
        };

        self.resolve_asset(&mut row)?;
        Ok(RowChange::Upsert(row))
    }
}

/// Patches task rows when their asset is renamed, removed or archived.
#[derive(Debug, Clone)]
pub struct AssetReferenceMarker {
    asset_refs: ReadStore<ReferenceRow>,
}

impl AssetReferenceMarker {
    pub fn new(asset_refs: ReadStore<ReferenceRow>) -> Self {
        Self { asset_refs }
    }
}

impl ForeignProjector<TaskRow> for AssetReferenceMarker {
    type Fact = ReferenceRow;

    fn interpret(&self, record: &EventRecord) -> Result<Option<ReferenceRow>, ProjectionError> {
        mirrored(&self.asset_refs, record)
    }

    fn project(&self, row: &TaskRow, reference: &ReferenceRow) -> RowChange<TaskRow> {
        if !row.asset.as_ref().is_some_and(|a| a.asset_id == reference.id) {
            return RowChange::Unchanged;
        }

        let mut next = row.clone();
        if let Some(asset) = next.asset.as_mut() {
            asset.kind = Some(reference.kind);
            asset.name = Some(reference.name.clone());
        }
        next.asset_retired = reference.retired;

        if &next == row {
            RowChange::Unchanged
        } else {
            RowChange::Upsert(next)
        }
    }
}
