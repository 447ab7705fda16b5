use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use super::repository::{conflict_on_busy, fetch_task, metrics_from_row, not_found, Repository};
use crate::auth::Actor;
use crate::errors::AppError;
use crate::metrics::{self, TaskTiming};
use crate::models::{DeveloperMetrics, DeveloperRating, TaskReview, TaskStatus};

impl Repository {
    // ==================== METRICS OPERATIONS ====================

    /// The metrics record of one developer, zeroed when none exists yet.
    pub async fn get_metrics(&self, developer_id: &str) -> Result<DeveloperMetrics, AppError> {
        let row = sqlx::query(
            "SELECT developer_id, tasks_completed, tasks_reassigned, average_completion_time, total_delivery_time, total_allocated_time FROM developer_metrics WHERE developer_id = ?",
        )
        .bind(developer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(metrics_from_row).unwrap_or_else(|| DeveloperMetrics {
            developer_id: developer_id.to_string(),
            ..DeveloperMetrics::default()
        }))
    }

    /// Rate every developer working on the actor's projects.
    pub async fn developer_ratings(&self, actor: &Actor) -> Result<Vec<DeveloperRating>, AppError> {
        let developers = sqlx::query(
            r#"SELECT u.id, u.email, COALESCE(m.tasks_reassigned, 0) AS tasks_reassigned
            FROM users u
            LEFT JOIN developer_metrics m ON m.developer_id = u.id
            WHERE u.id IN (
                SELECT pd.developer_id FROM project_developers pd
                JOIN projects p ON p.id = pd.project_id
                WHERE p.manager_id = ?
                UNION
                SELECT td.developer_id FROM task_developers td
                JOIN tasks t ON t.id = td.task_id
                JOIN projects p ON p.id = t.project_id
                WHERE p.manager_id = ?
            )
            ORDER BY u.email"#,
        )
        .bind(&actor.user_id)
        .bind(&actor.user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut ratings = Vec::with_capacity(developers.len());
        for developer in &developers {
            let developer_id: String = developer.get("id");
            let tasks_reassigned: i64 = developer.get("tasks_reassigned");

            let rows = sqlx::query(
                r#"SELECT t.status, t.start_time, t.end_time, t.manager_start_time, t.manager_end_time
                FROM tasks t
                JOIN task_developers td ON td.task_id = t.id
                JOIN projects p ON p.id = t.project_id
                WHERE td.developer_id = ? AND p.manager_id = ?"#,
            )
            .bind(&developer_id)
            .bind(&actor.user_id)
            .fetch_all(&self.pool)
            .await?;

            let timings: Vec<TaskTiming> = rows.iter().map(timing_from_row).collect();
            let summary = metrics::summarize(&timings);

            ratings.push(DeveloperRating {
                developer_id,
                developer: developer.get("email"),
                tasks_completed: summary.tasks_completed,
                average_completion_time: summary
                    .average_completion_time
                    .map(metrics::format_hours_minutes)
                    .unwrap_or_else(|| "N/A".to_string()),
                tasks_reassigned,
                average_delivery_status: summary.average_delivery_status,
                rating: metrics::rating(
                    summary.tasks_completed,
                    tasks_reassigned,
                    summary.average_delivery_status,
                ),
            });
        }

        Ok(ratings)
    }

    /// Review a completed task of an owned project and fold the result into
    /// each assignee's metrics record.
    pub async fn review_task(&self, actor: &Actor, id: &str) -> Result<TaskReview, AppError> {
        let mut tx = self.pool.begin().await?;

        let (task, manager_id) = fetch_task(&mut tx, id)
            .await?
            .ok_or_else(|| not_found("Task", id))?;
        if manager_id != actor.user_id {
            return Err(self.deny("Task", id));
        }

        let outcome = metrics::review(&TaskTiming {
            status: task.status,
            start_time: task.start_time,
            end_time: task.end_time,
            manager_start_time: task.manager_start_time,
            manager_end_time: task.manager_end_time,
        })?;

        let actual_seconds = outcome.actual.num_seconds();
        let allocated_seconds = outcome.allocated.num_seconds();

        for developer_id in &task.developer_ids {
            let previous: Option<f64> = sqlx::query_scalar(
                "SELECT average_completion_time FROM developer_metrics WHERE developer_id = ?",
            )
            .bind(developer_id)
            .fetch_optional(&mut *tx)
            .await?;
            let average =
                metrics::rolling_average(previous.unwrap_or(0.0), actual_seconds as f64);

            sqlx::query(
                r#"INSERT INTO developer_metrics
                    (developer_id, average_completion_time, total_delivery_time, total_allocated_time)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(developer_id) DO UPDATE SET
                    average_completion_time = excluded.average_completion_time,
                    total_delivery_time = total_delivery_time + excluded.total_delivery_time,
                    total_allocated_time = total_allocated_time + excluded.total_allocated_time"#,
            )
            .bind(developer_id)
            .bind(average)
            .bind(actual_seconds)
            .bind(allocated_seconds)
            .execute(&mut *tx)
            .await
            .map_err(conflict_on_busy)?;
        }

        tx.commit().await.map_err(conflict_on_busy)?;

        tracing::info!(
            task_id = id,
            delivery_status = ?outcome.delivery_status,
            "task reviewed"
        );

        Ok(TaskReview {
            task_id: task.id,
            time_taken: metrics::format_days_hours_minutes(outcome.actual),
            allocated_time: metrics::format_days_hours_minutes(outcome.allocated),
            time_difference: metrics::format_days_hours_minutes(outcome.difference()),
            delivery_status: outcome.delivery_status,
            time_taken_seconds: actual_seconds,
            allocated_time_seconds: allocated_seconds,
        })
    }
}

/// Add to the lifecycle counters of every listed developer.
pub(super) async fn bump_counters(
    conn: &mut SqliteConnection,
    developer_ids: &[String],
    completed: i64,
    reassigned: i64,
) -> Result<(), AppError> {
    if completed == 0 && reassigned == 0 {
        return Ok(());
    }

    for developer_id in developer_ids {
        sqlx::query(
            r#"INSERT INTO developer_metrics (developer_id, tasks_completed, tasks_reassigned)
            VALUES (?, ?, ?)
            ON CONFLICT(developer_id) DO UPDATE SET
                tasks_completed = tasks_completed + excluded.tasks_completed,
                tasks_reassigned = tasks_reassigned + excluded.tasks_reassigned"#,
        )
        .bind(developer_id)
        .bind(completed)
        .bind(reassigned)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn timing_from_row(row: &sqlx::sqlite::SqliteRow) -> TaskTiming {
    let status: String = row.get("status");
    let start_time: Option<DateTime<Utc>> = row.get("start_time");
    let end_time: Option<DateTime<Utc>> = row.get("end_time");
    TaskTiming {
        status: TaskStatus::parse(&status).unwrap_or(TaskStatus::NotStarted),
        start_time,
        end_time,
        manager_start_time: row.get("manager_start_time"),
        manager_end_time: row.get("manager_end_time"),
    }
}
