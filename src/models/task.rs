use std::fmt;
use std::str::FromStr;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Default, Clone)]
pub struct TaskItem {
    /// UUID to identify the task
    pub id: Uuid,
    /// The project this task belongs to
    pub project_id: Uuid,
    /// Title of the task
    pub title: String,
    /// Optional markdown description
    pub description_markdown: Option<String>,
    /// Kanban column the task currently sits in
    pub status: TaskStatus,
    /// User id of the task's author
    pub author_id: String,
    /// When the task was created
    pub created_at: Timestamp,
}

/// Kanban column. Every status is reachable from every other one; the only
/// transition guard is project membership.
#[derive(Serialize, Deserialize, Default, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TaskStatus {
    #[default]
    Backlog,
    InProgress,
    Blocked,
    Done,
}

impl TaskStatus {
    /// Column order of the kanban board
    pub const COLUMNS: [TaskStatus; 4] = [
        TaskStatus::Backlog,
        TaskStatus::InProgress,
        TaskStatus::Blocked,
        TaskStatus::Done,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::Backlog => "Backlog",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Blocked => "Blocked",
            TaskStatus::Done => "Done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown status '{0}'. Expected one of: backlog, in-progress, blocked, done")]
pub struct ParseTaskStatusError(String);

impl FromStr for TaskStatus {
    type Err = ParseTaskStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "backlog" => Ok(TaskStatus::Backlog),
            "in-progress" | "inprogress" | "progress" => Ok(TaskStatus::InProgress),
            "blocked" => Ok(TaskStatus::Blocked),
            "done" => Ok(TaskStatus::Done),
            other => Err(ParseTaskStatusError(other.to_string())),
        }
    }
}
