use chrono::{DateTime, Utc};

use tania_core::{AggregateId, AggregateType};
use tania_events::integration::is_retirement;
use tania_tasks::{
    AssetLink, CancelTask, ChangeTaskDescription, ChangeTaskDueDate, ChangeTaskPriority,
    ChangeTaskTitle, CompleteTask, CreateTask, Task, TaskCommand, TaskDomain, TaskId,
    TaskPriority, TaskStatus,
};

use super::{CommandError, committed_row};
use crate::projections::TaskRow;
use crate::projections::tasks::ASSET_SOURCES;
use crate::read_model::ReadStore;
use crate::repository::Repository;

/// Task creation as submitted by a caller; the service replays the asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: String,
    pub category: String,
    pub domain: TaskDomain,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub asset_id: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

/// Farm work items.
#[derive(Debug, Clone)]
pub struct TasksService {
    repository: Repository,
    tasks: ReadStore<TaskRow>,
}

impl TasksService {
    pub fn new(repository: Repository, tasks: ReadStore<TaskRow>) -> Self {
        Self { repository, tasks }
    }

    pub fn create_task(&self, request: CreateTaskRequest) -> Result<TaskRow, CommandError> {
        let asset = request
            .asset_id
            .map(|asset_id| self.asset_link(request.domain, asset_id))
            .transpose()?;

        let cmd = CreateTask {
            title: request.title,
            description: request.description,
            category: request.category,
            domain: request.domain,
            priority: request.priority,
            due_date: request.due_date,
            asset,
            occurred_at: request.occurred_at,
        };
        let id = TaskId::generate().aggregate_id();
        let done = self.repository.create::<Task>(id, &TaskCommand::Create(cmd))?;
        committed_row(&self.tasks, id, &done.report)
    }

    pub fn change_task_title(&self, task_id: TaskId, cmd: ChangeTaskTitle) -> Result<TaskRow, CommandError> {
        self.task_command(task_id, TaskCommand::ChangeTitle(cmd))
    }

    pub fn change_task_description(
        &self,
        task_id: TaskId,
        cmd: ChangeTaskDescription,
    ) -> Result<TaskRow, CommandError> {
        self.task_command(task_id, TaskCommand::ChangeDescription(cmd))
    }

    pub fn change_task_priority(
        &self,
        task_id: TaskId,
        cmd: ChangeTaskPriority,
    ) -> Result<TaskRow, CommandError> {
        self.task_command(task_id, TaskCommand::ChangePriority(cmd))
    }

    pub fn change_task_due_date(
        &self,
        task_id: TaskId,
        cmd: ChangeTaskDueDate,
    ) -> Result<TaskRow, CommandError> {
        self.task_command(task_id, TaskCommand::ChangeDueDate(cmd))
    }

    pub fn complete_task(&self, task_id: TaskId, cmd: CompleteTask) -> Result<TaskRow, CommandError> {
        self.task_command(task_id, TaskCommand::Complete(cmd))
    }

    pub fn cancel_task(&self, task_id: TaskId, cmd: CancelTask) -> Result<TaskRow, CommandError> {
        self.task_command(task_id, TaskCommand::Cancel(cmd))
    }

    fn task_command(&self, task_id: TaskId, cmd: TaskCommand) -> Result<TaskRow, CommandError> {
        let id = task_id.aggregate_id();
        let done = self.repository.execute::<Task>(id, &cmd)?;
        committed_row(&self.tasks, id, &done.report)
    }

    /// Replay the asset's stream through the integration kinds only.
    ///
    /// Domains without an asset type search every assignable type, so the aggregate
    /// can reject the reference with a precise message.
    fn asset_link(&self, domain: TaskDomain, asset_id: AggregateId) -> Result<AssetLink, CommandError> {
        let candidates: Vec<AggregateType> = match domain.asset_type() {
            Some(asset_type) => vec![asset_type],
            None => ASSET_SOURCES.to_vec(),
        };

        for asset_type in &candidates {
            let stream = self
                .repository
                .store()
                .events_of(*asset_type, asset_id)
                .map_err(|e| CommandError::Storage(e.to_string()))?;
            if stream.is_empty() {
                continue;
            }
            return Ok(AssetLink {
                asset_id,
                asset_type: *asset_type,
                exists: true,
                retired: stream.iter().any(|r| is_retirement(r.kind())),
            });
        }

        Ok(AssetLink {
            asset_id,
            asset_type: candidates.first().copied().unwrap_or(AggregateType::Area),
            exists: false,
            retired: false,
        })
    }

    pub fn task(&self, task_id: TaskId) -> Result<TaskRow, CommandError> {
        Ok(self.tasks.find(task_id.aggregate_id())?)
    }

    pub fn tasks(&self) -> Result<Vec<TaskRow>, CommandError> {
        Ok(self.tasks.all()?)
    }

    pub fn tasks_with_status(&self, status: TaskStatus) -> Result<Vec<TaskRow>, CommandError> {
        Ok(self.tasks.find_by(|t| t.status == status)?)
    }

    pub fn tasks_for_asset(&self, asset_id: AggregateId) -> Result<Vec<TaskRow>, CommandError> {
        Ok(self
            .tasks
            .find_by(|t| t.asset.as_ref().is_some_and(|a| a.asset_id == asset_id))?)
    }

    /// Open tasks whose due date is before `now`.
    pub fn overdue_tasks(&self, now: DateTime<Utc>) -> Result<Vec<TaskRow>, CommandError> {
        Ok(self.tasks.find_by(|t| t.is_overdue(now))?)
    }

    /// Open tasks attached to an asset that has since been retired.
    pub fn tasks_with_retired_asset(&self) -> Result<Vec<TaskRow>, CommandError> {
        Ok(self.tasks.find_by(|t| t.is_open() && t.asset_retired)?)
    }
}
