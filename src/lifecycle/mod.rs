//! Task lifecycle engine.
//!
//! Decides whether a start/complete/restart command is legal for the current
//! state and actor, and what the status and timestamps look like afterwards.
//! The store applies the resulting [`TransitionOutcome`] in one transaction.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::codes;
use crate::models::TaskStatus;

/// A lifecycle command issued against a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Start,
    Complete,
    Restart,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Start => "start",
            Transition::Complete => "complete",
            Transition::Restart => "restart",
        }
    }

    /// Whether an actor standing in `relation` to the task may issue this command.
    pub fn permits(&self, relation: ActorRelation) -> bool {
        match self {
            Transition::Start | Transition::Complete => relation.is_assignee,
            Transition::Restart => relation.is_assignee || relation.is_manager,
        }
    }

    pub fn success_message(&self) -> &'static str {
        match self {
            Transition::Start => "Task is now in progress.",
            Transition::Complete => "Task completed.",
            Transition::Restart => "Task restarted.",
        }
    }
}

/// How the acting user relates to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActorRelation {
    /// Listed among the task's developers
    pub is_assignee: bool,
    /// Manager of the task's project
    pub is_manager: bool,
}

/// The lifecycle-relevant slice of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleState {
    pub status: TaskStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// New state plus the metric counters the transition feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub state: LifecycleState,
    /// Bump `tasks_completed` for every assignee
    pub counts_completion: bool,
    /// Bump `tasks_reassigned` for every assignee and the task's restart count
    pub counts_reassignment: bool,
}

/// A transition attempted from the wrong state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Task has already been started.")]
    AlreadyStarted,
    #[error("Task is not in progress.")]
    NotStarted,
    #[error("Task is not in progress.")]
    AlreadyCompleted,
    #[error("Task already has an end time.")]
    EndTimeAlreadySet,
    #[error("Task is not completed.")]
    NotCompleted,
    /// Another request changed the status between read and write
    #[error("Task was modified by another request.")]
    StateChanged,
}

impl TransitionError {
    pub fn code(&self) -> &'static str {
        match self {
            TransitionError::AlreadyStarted => codes::TASK_ALREADY_STARTED,
            TransitionError::NotStarted => codes::TASK_NOT_STARTED,
            TransitionError::AlreadyCompleted | TransitionError::EndTimeAlreadySet => {
                codes::TASK_ALREADY_COMPLETED
            }
            TransitionError::NotCompleted => codes::TASK_NOT_COMPLETED,
            TransitionError::StateChanged => codes::TASK_STATE_CHANGED,
        }
    }
}

/// Compute the effect of `transition` on `current` at time `now`.
pub fn apply(
    transition: Transition,
    current: LifecycleState,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, TransitionError> {
    match transition {
        Transition::Start => {
            if current.status != TaskStatus::NotStarted {
                return Err(TransitionError::AlreadyStarted);
            }
            Ok(TransitionOutcome {
                state: LifecycleState {
                    status: TaskStatus::InProgress,
                    start_time: current.start_time.or(Some(now)),
                    end_time: current.end_time,
                },
                counts_completion: false,
                counts_reassignment: false,
            })
        }
        Transition::Complete => {
            match current.status {
                TaskStatus::NotStarted => return Err(TransitionError::NotStarted),
                TaskStatus::Completed => return Err(TransitionError::AlreadyCompleted),
                TaskStatus::InProgress => {}
            }
            if current.end_time.is_some() {
                return Err(TransitionError::EndTimeAlreadySet);
            }
            Ok(TransitionOutcome {
                state: LifecycleState {
                    status: TaskStatus::Completed,
                    start_time: current.start_time,
                    end_time: Some(now),
                },
                counts_completion: true,
                counts_reassignment: false,
            })
        }
        Transition::Restart => {
            if current.status != TaskStatus::Completed {
                return Err(TransitionError::NotCompleted);
            }
            Ok(TransitionOutcome {
                state: LifecycleState {
                    status: TaskStatus::InProgress,
                    start_time: Some(now),
                    end_time: None,
                },
                counts_completion: false,
                counts_reassignment: true,
            })
        }
    }
}

/// Status change made through a manager's field edit.
///
/// No transition checks apply; only the first-time stamping rules do.
pub fn edit_status(
    current: LifecycleState,
    status: TaskStatus,
    now: DateTime<Utc>,
) -> LifecycleState {
    let mut next = LifecycleState { status, ..current };
    match status {
        TaskStatus::InProgress if next.start_time.is_none() => next.start_time = Some(now),
        TaskStatus::Completed if next.end_time.is_none() => next.end_time = Some(now),
        _ => {}
    }
    next
}
