//! Tasks domain module (event-sourced).
//!
//! Farm work items, optionally attached to an asset (area, crop batch, reservoir
//! or material). Pure deterministic domain logic.

pub mod task;

pub use task::{
    AssetLink, CancelTask, ChangeTaskDescription, ChangeTaskDueDate, ChangeTaskPriority,
    ChangeTaskTitle, CompleteTask, CreateTask, Task, TaskCancelled, TaskCommand, TaskCompleted,
    TaskCreated, TaskDescriptionChanged, TaskDomain, TaskDueDateChanged, TaskEvent, TaskId,
    TaskPriority, TaskPriorityChanged, TaskStatus, TaskTitleChanged,
};
