use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::metrics::bump_counters;
use super::repository::{
    conflict_on_busy, fetch_project, fetch_task, not_found, task_from_row, Repository,
    TASK_COLUMNS,
};
use crate::auth::Actor;
use crate::errors::AppError;
use crate::lifecycle::{self, ActorRelation, LifecycleState, Transition, TransitionError};
use crate::models::{CreateTaskRequest, Project, Role, Task, UpdateTaskRequest};

impl Repository {
    // ==================== TASK OPERATIONS ====================

    /// Tasks the actor works on, or tasks of the projects the actor manages.
    pub async fn list_tasks(&self, actor: &Actor) -> Result<Vec<Task>, AppError> {
        let sql = match actor.role {
            Role::Manager => format!(
                "SELECT {} FROM tasks t JOIN projects p ON p.id = t.project_id WHERE p.manager_id = ? ORDER BY t.created_at",
                TASK_COLUMNS
            ),
            Role::Developer => format!(
                "SELECT {} FROM tasks t JOIN projects p ON p.id = t.project_id WHERE t.id IN (SELECT task_id FROM task_developers WHERE developer_id = ?) ORDER BY t.created_at",
                TASK_COLUMNS
            ),
        };

        let rows = sqlx::query(&sql)
            .bind(&actor.user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(task_from_row).collect())
    }

    /// Tasks of a project the actor can see.
    pub async fn list_project_tasks(
        &self,
        actor: &Actor,
        project_id: &str,
    ) -> Result<Vec<Task>, AppError> {
        self.visible_project(actor, project_id).await?;

        let sql = format!(
            "SELECT {} FROM tasks t JOIN projects p ON p.id = t.project_id WHERE t.project_id = ? ORDER BY t.created_at",
            TASK_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(task_from_row).collect())
    }

    /// Load a task the actor manages or is assigned to.
    pub async fn visible_task(&self, actor: &Actor, id: &str) -> Result<Task, AppError> {
        let mut conn = self.pool.acquire().await?;
        let (task, manager_id) = fetch_task(&mut conn, id)
            .await?
            .ok_or_else(|| not_found("Task", id))?;

        if manager_id == actor.user_id || task.is_assigned_to(&actor.user_id) {
            Ok(task)
        } else {
            Err(self.deny("Task", id))
        }
    }

    /// Create a task under an owned project.
    pub async fn create_task(
        &self,
        actor: &Actor,
        project_id: &str,
        request: &CreateTaskRequest,
    ) -> Result<Task, AppError> {
        validate_window(request.manager_start_time, request.manager_end_time)?;

        let mut tx = self.pool.begin().await?;
        let project = self.owned_project_on(&mut tx, actor, project_id).await?;
        ensure_on_project(&project, &request.developer_ids)?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO tasks (id, project_id, title, description, status, manager_start_time, manager_end_time, restart_count, created_at, updated_at) VALUES (?, ?, ?, ?, 'not_started', ?, ?, 0, ?, ?)"
        )
        .bind(&id)
        .bind(project_id)
        .bind(request.title.trim())
        .bind(&request.description)
        .bind(request.manager_start_time)
        .bind(request.manager_end_time)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        insert_assignees(&mut tx, &id, &request.developer_ids).await?;

        let task = load_task(&mut tx, &id).await?;
        tx.commit().await?;

        tracing::info!(task_id = %id, project_id, "task created");
        Ok(task)
    }

    /// Edit fields of a task in an owned project.
    ///
    /// A status change here skips the transition checks and only applies the
    /// first-time timestamp rules.
    pub async fn update_task(
        &self,
        actor: &Actor,
        id: &str,
        request: &UpdateTaskRequest,
    ) -> Result<Task, AppError> {
        let mut tx = self.pool.begin().await?;
        let existing = self.owned_task_on(&mut tx, actor, id).await?;

        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .unwrap_or(&existing.title)
            .to_string();
        let description = request.description.clone().or(existing.description.clone());
        let manager_start_time = request.manager_start_time.or(existing.manager_start_time);
        let manager_end_time = request.manager_end_time.or(existing.manager_end_time);
        validate_window(manager_start_time, manager_end_time)?;

        let current = LifecycleState {
            status: existing.status,
            start_time: existing.start_time,
            end_time: existing.end_time,
        };
        let now = Utc::now();
        let next = match request.status {
            Some(status) => lifecycle::edit_status(current, status, now),
            None => current,
        };

        sqlx::query(
            "UPDATE tasks SET title = ?, description = ?, status = ?, start_time = ?, end_time = ?, manager_start_time = ?, manager_end_time = ?, updated_at = ? WHERE id = ?"
        )
        .bind(&title)
        .bind(&description)
        .bind(next.status.as_str())
        .bind(next.start_time)
        .bind(next.end_time)
        .bind(manager_start_time)
        .bind(manager_end_time)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let task = load_task(&mut tx, id).await?;
        tx.commit().await?;

        Ok(task)
    }

    /// Delete a task in an owned project.
    pub async fn delete_task(&self, actor: &Actor, id: &str) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        self.owned_task_on(&mut conn, actor, id).await?;

        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        tracing::info!(task_id = id, "task deleted");
        Ok(())
    }

    /// Assign project developers to a task.
    ///
    /// Returns the updated task and the ids that were not already assigned.
    pub async fn assign_task_developers(
        &self,
        actor: &Actor,
        id: &str,
        developer_ids: &[String],
    ) -> Result<(Task, Vec<String>), AppError> {
        let mut tx = self.pool.begin().await?;
        let existing = self.owned_task_on(&mut tx, actor, id).await?;

        let project = fetch_project(&mut tx, &existing.project_id)
            .await?
            .ok_or_else(|| not_found("Project", &existing.project_id))?;
        ensure_on_project(&project, developer_ids)?;

        let added = insert_assignees(&mut tx, id, developer_ids).await?;
        touch_task(&mut tx, id).await?;

        let task = load_task(&mut tx, id).await?;
        tx.commit().await?;

        Ok((task, added))
    }

    /// Remove developers from a task.
    pub async fn unassign_task_developers(
        &self,
        actor: &Actor,
        id: &str,
        developer_ids: &[String],
    ) -> Result<Task, AppError> {
        let mut tx = self.pool.begin().await?;
        self.owned_task_on(&mut tx, actor, id).await?;

        for developer_id in developer_ids {
            sqlx::query("DELETE FROM task_developers WHERE task_id = ? AND developer_id = ?")
                .bind(id)
                .bind(developer_id)
                .execute(&mut *tx)
                .await?;
        }
        touch_task(&mut tx, id).await?;

        let task = load_task(&mut tx, id).await?;
        tx.commit().await?;

        Ok(task)
    }

    /// Apply a lifecycle command and its metric side effects in one transaction.
    pub async fn transition_task(
        &self,
        actor: &Actor,
        id: &str,
        transition: Transition,
    ) -> Result<Task, AppError> {
        let mut tx = self.pool.begin().await?;

        let (task, manager_id) = fetch_task(&mut tx, id)
            .await?
            .ok_or_else(|| not_found("Task", id))?;

        let relation = ActorRelation {
            is_assignee: task.is_assigned_to(&actor.user_id),
            is_manager: manager_id == actor.user_id,
        };
        if !transition.permits(relation) {
            return Err(self.deny("Task", id));
        }

        let current = LifecycleState {
            status: task.status,
            start_time: task.start_time,
            end_time: task.end_time,
        };
        let now = Utc::now();
        let outcome = lifecycle::apply(transition, current, now)?;

        let result = sqlx::query(
            "UPDATE tasks SET status = ?, start_time = ?, end_time = ?, restart_count = restart_count + ?, updated_at = ? WHERE id = ? AND status = ?"
        )
        .bind(outcome.state.status.as_str())
        .bind(outcome.state.start_time)
        .bind(outcome.state.end_time)
        .bind(i64::from(outcome.counts_reassignment))
        .bind(now)
        .bind(id)
        .bind(current.status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(conflict_on_busy)?;

        if result.rows_affected() == 0 {
            return Err(TransitionError::StateChanged.into());
        }

        bump_counters(
            &mut tx,
            &task.developer_ids,
            i64::from(outcome.counts_completion),
            i64::from(outcome.counts_reassignment),
        )
        .await?;

        let updated = load_task(&mut tx, id).await?;
        tx.commit().await.map_err(conflict_on_busy)?;

        tracing::info!(
            task_id = id,
            actor = %actor.user_id,
            transition = transition.as_str(),
            status = updated.status.as_str(),
            "task transitioned"
        );
        Ok(updated)
    }

    pub(super) async fn owned_task_on(
        &self,
        conn: &mut SqliteConnection,
        actor: &Actor,
        id: &str,
    ) -> Result<Task, AppError> {
        let (task, manager_id) = fetch_task(conn, id)
            .await?
            .ok_or_else(|| not_found("Task", id))?;

        if manager_id == actor.user_id {
            Ok(task)
        } else {
            Err(self.deny("Task", id))
        }
    }
}

/// The manager window may be open-ended, but not inverted.
fn validate_window(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<(), AppError> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => Err(AppError::validation(
            "manager_end_time must not be before manager_start_time",
        )),
        _ => Ok(()),
    }
}

fn ensure_on_project(project: &Project, developer_ids: &[String]) -> Result<(), AppError> {
    match developer_ids.iter().find(|id| !project.has_developer(id)) {
        Some(id) => Err(AppError::validation(format!(
            "Developer {} is not assigned to project {}",
            id, project.id
        ))),
        None => Ok(()),
    }
}

async fn insert_assignees(
    conn: &mut SqliteConnection,
    task_id: &str,
    developer_ids: &[String],
) -> Result<Vec<String>, AppError> {
    let mut added = Vec::new();
    for developer_id in developer_ids {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO task_developers (task_id, developer_id) VALUES (?, ?)",
        )
        .bind(task_id)
        .bind(developer_id)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() > 0 {
            added.push(developer_id.clone());
        }
    }
    Ok(added)
}

async fn load_task(conn: &mut SqliteConnection, id: &str) -> Result<Task, AppError> {
    fetch_task(conn, id)
        .await?
        .map(|(task, _)| task)
        .ok_or_else(|| not_found("Task", id))
}

async fn touch_task(conn: &mut SqliteConnection, id: &str) -> Result<(), AppError> {
    sqlx::query("UPDATE tasks SET updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
