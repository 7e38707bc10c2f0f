use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tania_core::{
    Aggregate, AggregateId, AggregateRoot, AggregateType, DomainError, typed_aggregate_id,
    validate_name,
};
use tania_events::impl_domain_event;

typed_aggregate_id!(
    /// Task identifier.
    TaskId
);

pub const TASK_CREATED: &str = "tasks.task.created";
pub const TASK_TITLE_CHANGED: &str = "tasks.task.title_changed";
pub const TASK_DESCRIPTION_CHANGED: &str = "tasks.task.description_changed";
pub const TASK_PRIORITY_CHANGED: &str = "tasks.task.priority_changed";
pub const TASK_DUE_DATE_CHANGED: &str = "tasks.task.due_date_changed";
pub const TASK_COMPLETED: &str = "tasks.task.completed";
pub const TASK_CANCELLED: &str = "tasks.task.cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Urgent,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskDomain {
    Area,
    Crop,
    Reservoir,
    Inventory,
    Finance,
    General,
}

impl TaskDomain {
    /// Aggregate type a task of this domain must point at, if any.
    pub fn asset_type(self) -> Option<AggregateType> {
        match self {
            TaskDomain::Area => Some(AggregateType::Area),
            TaskDomain::Crop => Some(AggregateType::Crop),
            TaskDomain::Reservoir => Some(AggregateType::Reservoir),
            TaskDomain::Inventory => Some(AggregateType::Material),
            TaskDomain::Finance | TaskDomain::General => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Created,
    Completed,
    Cancelled,
}

/// What the caller learned by replaying the referenced asset's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetLink {
    pub asset_id: AggregateId,
    pub asset_type: AggregateType,
    pub exists: bool,
    pub retired: bool,
}

/// Aggregate root: Task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    id: TaskId,
    title: String,
    description: String,
    category: String,
    domain: TaskDomain,
    priority: TaskPriority,
    due_date: Option<DateTime<Utc>>,
    asset_id: Option<AggregateId>,
    status: TaskStatus,
    created_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Task {
    pub fn id_typed(&self) -> TaskId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn domain(&self) -> TaskDomain {
        self.domain
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    pub fn due_date(&self) -> Option<DateTime<Utc>> {
        self.due_date
    }

    pub fn asset_id(&self) -> Option<AggregateId> {
        self.asset_id
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }
}

impl AggregateRoot for Task {
    type Id = TaskId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateTask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTask {
    pub title: String,
    pub description: String,
    pub category: String,
    pub domain: TaskDomain,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub asset: Option<AssetLink>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeTaskTitle {
    pub title: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeTaskDescription {
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeTaskPriority {
    pub priority: TaskPriority,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeTaskDueDate {
    pub due_date: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteTask {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelTask {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskCommand {
    Create(CreateTask),
    ChangeTitle(ChangeTaskTitle),
    ChangeDescription(ChangeTaskDescription),
    ChangePriority(ChangeTaskPriority),
    ChangeDueDate(ChangeTaskDueDate),
    Complete(CompleteTask),
    Cancel(CancelTask),
}

/// Event: TaskCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCreated {
    pub task_id: TaskId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub domain: TaskDomain,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub asset_id: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTitleChanged {
    pub title: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptionChanged {
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPriorityChanged {
    pub priority: TaskPriority,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDueDateChanged {
    pub due_date: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCompleted {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCancelled {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskEvent {
    Created(TaskCreated),
    TitleChanged(TaskTitleChanged),
    DescriptionChanged(TaskDescriptionChanged),
    PriorityChanged(TaskPriorityChanged),
    DueDateChanged(TaskDueDateChanged),
    Completed(TaskCompleted),
    Cancelled(TaskCancelled),
}

impl_domain_event!(TaskEvent {
    Created(TaskCreated) => TASK_CREATED,
    TitleChanged(TaskTitleChanged) => TASK_TITLE_CHANGED,
    DescriptionChanged(TaskDescriptionChanged) => TASK_DESCRIPTION_CHANGED,
    PriorityChanged(TaskPriorityChanged) => TASK_PRIORITY_CHANGED,
    DueDateChanged(TaskDueDateChanged) => TASK_DUE_DATE_CHANGED,
    Completed(TaskCompleted) => TASK_COMPLETED,
    Cancelled(TaskCancelled) => TASK_CANCELLED,
});

impl Aggregate for Task {
    type Command = TaskCommand;
    type Event = TaskEvent;
    type Error = DomainError;

    const TYPE: AggregateType = AggregateType::Task;

    fn initial(id: AggregateId) -> Self {
        Self {
            id: TaskId::new(id),
            title: String::new(),
            description: String::new(),
            category: String::new(),
            domain: TaskDomain::General,
            priority: TaskPriority::Normal,
            due_date: None,
            asset_id: None,
            status: TaskStatus::Created,
            created_at: None,
            version: 0,
            created: false,
        }
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TaskEvent::Created(e) => {
                self.id = e.task_id;
                self.title = e.title.clone();
                self.description = e.description.clone();
                self.category = e.category.clone();
                self.domain = e.domain;
                self.priority = e.priority;
                self.due_date = e.due_date;
                self.asset_id = e.asset_id;
                self.status = TaskStatus::Created;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            TaskEvent::TitleChanged(e) => self.title = e.title.clone(),
            TaskEvent::DescriptionChanged(e) => self.description = e.description.clone(),
            TaskEvent::PriorityChanged(e) => self.priority = e.priority,
            TaskEvent::DueDateChanged(e) => self.due_date = e.due_date,
            TaskEvent::Completed(_) => self.status = TaskStatus::Completed,
            TaskEvent::Cancelled(_) => self.status = TaskStatus::Cancelled,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TaskCommand::Create(cmd) => self.handle_create(cmd),
            other => {
                self.ensure_open()?;
                Ok(vec![self.handle_update(other)?])
            }
        }
    }
}

impl Task {
    fn ensure_open(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        match self.status {
            TaskStatus::Created => Ok(()),
            TaskStatus::Completed => Err(DomainError::validation("task is already completed")),
            TaskStatus::Cancelled => Err(DomainError::validation("task has been cancelled")),
        }
    }

    fn check_due_date(
        due_date: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        match due_date {
            Some(due) if due.date_naive() < created_at.date_naive() => Err(
                DomainError::validation("due date cannot be before the creation date"),
            ),
            _ => Ok(()),
        }
    }

    fn check_asset(
        domain: TaskDomain,
        asset: Option<&AssetLink>,
    ) -> Result<Option<AggregateId>, DomainError> {
        match (domain.asset_type(), asset) {
            (None, None) => Ok(None),
            (None, Some(_)) => Err(DomainError::validation(format!(
                "{domain:?} tasks cannot reference an asset"
            ))),
            (Some(expected), None) => Err(DomainError::validation(format!(
                "{domain:?} tasks require a {expected} asset"
            ))),
            (Some(expected), Some(link)) => {
                if link.asset_type != expected {
                    return Err(DomainError::validation(format!(
                        "{domain:?} tasks require a {expected} asset, got {}",
                        link.asset_type
                    )));
                }
                if !link.exists {
                    return Err(DomainError::validation(format!(
                        "{expected} {} does not exist",
                        link.asset_id
                    )));
                }
                if link.retired {
                    return Err(DomainError::validation(format!(
                        "{expected} {} is no longer active",
                        link.asset_id
                    )));
                }
                Ok(Some(link.asset_id))
            }
        }
    }

    fn handle_create(&self, cmd: &CreateTask) -> Result<Vec<TaskEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("task already exists"));
        }
        let title = validate_name("task title", &cmd.title)?;
        let category = validate_name("task category", &cmd.category)?;
        Self::check_due_date(cmd.due_date, cmd.occurred_at)?;
        let asset_id = Self::check_asset(cmd.domain, cmd.asset.as_ref())?;

        Ok(vec![TaskEvent::Created(TaskCreated {
            task_id: self.id,
            title,
            description: cmd.description.trim().to_string(),
            category,
            domain: cmd.domain,
            priority: cmd.priority,
            due_date: cmd.due_date,
            asset_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, command: &TaskCommand) -> Result<TaskEvent, DomainError> {
        let event = match command {
            TaskCommand::Create(_) => return Err(DomainError::conflict("task already exists")),
            TaskCommand::ChangeTitle(cmd) => TaskEvent::TitleChanged(TaskTitleChanged {
                title: validate_name("task title", &cmd.title)?,
                occurred_at: cmd.occurred_at,
            }),
            TaskCommand::ChangeDescription(cmd) => {
                TaskEvent::DescriptionChanged(TaskDescriptionChanged {
                    description: cmd.description.trim().to_string(),
                    occurred_at: cmd.occurred_at,
                })
            }
            TaskCommand::ChangePriority(cmd) => TaskEvent::PriorityChanged(TaskPriorityChanged {
                priority: cmd.priority,
                occurred_at: cmd.occurred_at,
            }),
            TaskCommand::ChangeDueDate(cmd) => {
                let created_at = self.created_at.ok_or_else(DomainError::not_found)?;
                Self::check_due_date(cmd.due_date, created_at)?;
                TaskEvent::DueDateChanged(TaskDueDateChanged {
                    due_date: cmd.due_date,
                    occurred_at: cmd.occurred_at,
                })
            }
            TaskCommand::Complete(cmd) => TaskEvent::Completed(TaskCompleted {
                occurred_at: cmd.occurred_at,
            }),
            TaskCommand::Cancel(cmd) => TaskEvent::Cancelled(TaskCancelled {
                occurred_at: cmd.occurred_at,
            }),
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-19T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn area_link() -> AssetLink {
        AssetLink {
            asset_id: AggregateId::new(),
            asset_type: AggregateType::Area,
            exists: true,
            retired: false,
        }
    }

    fn create_cmd(domain: TaskDomain, asset: Option<AssetLink>) -> CreateTask {
        CreateTask {
            title: "Weed the north bed".into(),
            description: "".into(),
            category: "sanitation".into(),
            domain,
            priority: TaskPriority::Urgent,
            due_date: Some(test_time() + Duration::days(2)),
            asset,
            occurred_at: test_time(),
        }
    }

    fn created_task() -> Task {
        let mut task = Task::initial(AggregateId::new());
        let events = task
            .handle(&TaskCommand::Create(create_cmd(
                TaskDomain::Area,
                Some(area_link()),
            )))
            .unwrap();
        task.apply(&events[0]);
        task
    }

    #[test]
    fn create_task_for_active_area() {
        let task = created_task();
        assert_eq!(task.status(), TaskStatus::Created);
        assert_eq!(task.domain(), TaskDomain::Area);
        assert!(task.asset_id().is_some());
    }

    #[test]
    fn create_task_rejects_retired_asset() {
        let task = Task::initial(AggregateId::new());
        let mut link = area_link();
        link.retired = true;
        let err = task
            .handle(&TaskCommand::Create(create_cmd(TaskDomain::Area, Some(link))))
            .unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("no longer active") => {}
            _ => panic!("Expected Validation error for retired asset"),
        }
    }

    #[test]
    fn create_task_rejects_missing_or_mismatched_asset() {
        let task = Task::initial(AggregateId::new());

        let mut missing = area_link();
        missing.exists = false;
        assert!(
            task.handle(&TaskCommand::Create(create_cmd(TaskDomain::Area, Some(missing))))
                .is_err()
        );
        assert!(
            task.handle(&TaskCommand::Create(create_cmd(TaskDomain::Crop, Some(area_link()))))
                .is_err()
        );
        assert!(
            task.handle(&TaskCommand::Create(create_cmd(TaskDomain::Inventory, None)))
                .is_err()
        );
        assert!(
            task.handle(&TaskCommand::Create(create_cmd(TaskDomain::General, None)))
                .is_ok()
        );
    }

    #[test]
    fn due_date_cannot_precede_creation() {
        let task = Task::initial(AggregateId::new());
        let mut cmd = create_cmd(TaskDomain::General, None);
        cmd.due_date = Some(test_time() - Duration::days(1));
        let err = task.handle(&TaskCommand::Create(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        // Same calendar day is fine.
        let mut cmd = create_cmd(TaskDomain::General, None);
        cmd.due_date = Some(test_time() - Duration::hours(1));
        assert!(task.handle(&TaskCommand::Create(cmd)).is_ok());
    }

    #[test]
    fn completed_task_rejects_modifications() {
        let mut task = created_task();
        let events = task
            .handle(&TaskCommand::Complete(CompleteTask {
                occurred_at: test_time(),
            }))
            .unwrap();
        task.apply(&events[0]);

        let err = task
            .handle(&TaskCommand::ChangePriority(ChangeTaskPriority {
                priority: TaskPriority::Normal,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = task
            .handle(&TaskCommand::Cancel(CancelTask {
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn commands_on_missing_task_are_not_found() {
        let task = Task::initial(AggregateId::new());
        let err = task
            .handle(&TaskCommand::Complete(CompleteTask {
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: a due date is accepted iff it is not on an earlier day.
            #[test]
            fn due_date_rule_is_day_granular(offset_hours in -96i64..96i64) {
                let task = Task::initial(AggregateId::new());
                let mut cmd = create_cmd(TaskDomain::General, None);
                let due = test_time() + Duration::hours(offset_hours);
                cmd.due_date = Some(due);
                let accepted = task.handle(&TaskCommand::Create(cmd)).is_ok();
                prop_assert_eq!(accepted, due.date_naive() >= test_time().date_naive());
            }
        }
    }
}
