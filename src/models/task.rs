//! Task model, lifecycle status and request bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored lifecycle status of a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not_started",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(TaskStatus::NotStarted),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }
}

/// Status as presented to clients, extending the stored status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    /// Not started and nobody is assigned yet
    Pending,
    NotStarted,
    InProgress,
    /// Back in progress after at least one restart
    Reassigned,
    Completed,
}

/// A unit of work inside a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub display_status: DisplayStatus,
    pub developer_ids: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub manager_start_time: Option<DateTime<Utc>>,
    pub manager_end_time: Option<DateTime<Utc>>,
    pub actual_time_spent_seconds: Option<i64>,
    pub restart_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_assigned_to(&self, user_id: &str) -> bool {
        self.developer_ids.iter().any(|id| id == user_id)
    }

    /// Recompute the derived fields after status, timestamps or assignees change.
    pub fn refresh_derived(&mut self) {
        self.display_status = match self.status {
            TaskStatus::NotStarted if self.developer_ids.is_empty() => DisplayStatus::Pending,
            TaskStatus::NotStarted => DisplayStatus::NotStarted,
            TaskStatus::InProgress if self.restart_count > 0 => DisplayStatus::Reassigned,
            TaskStatus::InProgress => DisplayStatus::InProgress,
            TaskStatus::Completed => DisplayStatus::Completed,
        };
        self.actual_time_spent_seconds = match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        };
    }
}

/// Request body for creating a task under a project.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub manager_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub manager_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub developer_ids: Vec<String>,
}

/// Request body for a manager editing a task.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub manager_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub manager_end_time: Option<DateTime<Utc>>,
}

/// Response body of a lifecycle command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionResponse {
    pub message: String,
    pub task: Task,
}
