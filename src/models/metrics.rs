//! Developer metrics records and the analytics response bodies.

use serde::{Deserialize, Serialize};

use crate::metrics::DeliveryStatus;

/// Per-developer counters, created on the first relevant event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeveloperMetrics {
    pub developer_id: String,
    pub tasks_completed: i64,
    pub tasks_reassigned: i64,
    /// Two-term rolling average, in seconds
    pub average_completion_time: f64,
    pub total_delivery_time: i64,
    pub total_allocated_time: i64,
}

/// One row of `GET /metrics/developers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeveloperRating {
    pub developer_id: String,
    /// Developer email address
    pub developer: String,
    pub tasks_completed: i64,
    pub average_completion_time: String,
    pub tasks_reassigned: i64,
    pub average_delivery_status: DeliveryStatus,
    pub rating: f64,
}

/// Result of the single-task detailed review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReview {
    pub task_id: String,
    pub time_taken: String,
    pub allocated_time: String,
    pub time_difference: String,
    pub delivery_status: DeliveryStatus,
    pub time_taken_seconds: i64,
    pub allocated_time_seconds: i64,
}
