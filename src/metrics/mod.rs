//! Developer metrics aggregation.
//!
//! Pure computations over task timings: completion averages, delivery status
//! against the manager's window, the weighted rating, and the single-task
//! review. Storage supplies the timings and persists the counters.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::TaskStatus;

/// Actual duration compared with the manager-allocated duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    #[serde(rename = "early")]
    Early,
    #[serde(rename = "on time")]
    OnTime,
    #[serde(rename = "late")]
    Late,
    #[serde(rename = "N/A")]
    NotAvailable,
}

impl DeliveryStatus {
    fn rating_weight(&self) -> f64 {
        match self {
            DeliveryStatus::Early => 0.5,
            DeliveryStatus::OnTime => 0.4,
            DeliveryStatus::Late => -0.1,
            DeliveryStatus::NotAvailable => 0.0,
        }
    }
}

/// Classify an actual duration against an allocated one.
pub fn classify(actual: Duration, allocated: Duration) -> DeliveryStatus {
    if actual < allocated {
        DeliveryStatus::Early
    } else if actual == allocated {
        DeliveryStatus::OnTime
    } else {
        DeliveryStatus::Late
    }
}

/// Timestamps and status of one task, as seen by the aggregator.
#[derive(Debug, Clone, Copy)]
pub struct TaskTiming {
    pub status: TaskStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub manager_start_time: Option<DateTime<Utc>>,
    pub manager_end_time: Option<DateTime<Utc>>,
}

impl TaskTiming {
    fn actual(&self) -> Option<Duration> {
        Some(self.end_time? - self.start_time?)
    }

    fn allocated(&self) -> Option<Duration> {
        Some(self.manager_end_time? - self.manager_start_time?)
    }
}

/// Completion statistics of one developer.
#[derive(Debug, Clone, PartialEq)]
pub struct DeveloperSummary {
    pub tasks_completed: i64,
    pub average_completion_time: Option<Duration>,
    pub average_delivery_status: DeliveryStatus,
}

fn mean(durations: &[Duration]) -> Option<Duration> {
    if durations.is_empty() {
        return None;
    }
    let total: i64 = durations.iter().map(|d| d.num_milliseconds()).sum();
    Some(Duration::milliseconds(total / durations.len() as i64))
}

/// Summarize the tasks assigned to one developer.
pub fn summarize(tasks: &[TaskTiming]) -> DeveloperSummary {
    let completed: Vec<&TaskTiming> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .collect();

    let actual: Vec<Duration> = completed.iter().filter_map(|t| t.actual()).collect();
    let allocated: Vec<Duration> = completed.iter().filter_map(|t| t.allocated()).collect();

    let average_completion_time = mean(&actual);
    let average_delivery_status = match (average_completion_time, mean(&allocated)) {
        (Some(actual), Some(allocated)) => classify(actual, allocated),
        _ => DeliveryStatus::NotAvailable,
    };

    DeveloperSummary {
        tasks_completed: completed.len() as i64,
        average_completion_time,
        average_delivery_status,
    }
}

/// Weighted developer score, rounded to one decimal. Not clamped.
pub fn rating(tasks_completed: i64, tasks_reassigned: i64, delivery: DeliveryStatus) -> f64 {
    let mut score = 0.0;
    if tasks_completed > 0 {
        score += 0.3;
    }
    if tasks_reassigned == 0 {
        score += 0.2;
    }
    score += delivery.rating_weight();
    (score * 5.0 * 10.0).round() / 10.0
}

/// `(old + new) / 2`, the running average kept on metrics records.
pub fn rolling_average(old_seconds: f64, new_seconds: f64) -> f64 {
    (old_seconds + new_seconds) / 2.0
}

/// "H hours, M minutes"
pub fn format_hours_minutes(duration: Duration) -> String {
    let sign = if duration < Duration::zero() { "-" } else { "" };
    let minutes = duration.num_minutes().abs();
    format!("{}{} hours, {} minutes", sign, minutes / 60, minutes % 60)
}

/// "D days, H hours, M minutes"
pub fn format_days_hours_minutes(duration: Duration) -> String {
    let sign = if duration < Duration::zero() { "-" } else { "" };
    let minutes = duration.num_minutes().abs();
    format!(
        "{}{} days, {} hours, {} minutes",
        sign,
        minutes / (24 * 60),
        (minutes % (24 * 60)) / 60,
        minutes % 60
    )
}

/// Why a task cannot be reviewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReviewError {
    #[error("Task is not completed.")]
    NotCompleted,
    #[error("Task is missing {0}.")]
    MissingTimestamp(&'static str),
}

/// Actual versus allocated time of one completed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewOutcome {
    pub actual: Duration,
    pub allocated: Duration,
    pub delivery_status: DeliveryStatus,
}

impl ReviewOutcome {
    pub fn difference(&self) -> Duration {
        (self.actual - self.allocated).abs()
    }
}

/// Compare a completed task's duration with its manager window.
pub fn review(timing: &TaskTiming) -> Result<ReviewOutcome, ReviewError> {
    if timing.status != TaskStatus::Completed {
        return Err(ReviewError::NotCompleted);
    }
    let start = timing
        .start_time
        .ok_or(ReviewError::MissingTimestamp("start_time"))?;
    let end = timing
        .end_time
        .ok_or(ReviewError::MissingTimestamp("end_time"))?;
    let manager_start = timing
        .manager_start_time
        .ok_or(ReviewError::MissingTimestamp("manager_start_time"))?;
    let manager_end = timing
        .manager_end_time
        .ok_or(ReviewError::MissingTimestamp("manager_end_time"))?;

    let actual = end - start;
    let allocated = manager_end - manager_start;
    Ok(ReviewOutcome {
        actual,
        allocated,
        delivery_status: classify(actual, allocated),
    })
}
