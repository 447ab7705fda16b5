//! Database repository for CRUD operations.
//!
//! Uses prepared statements and transactions for data integrity. Operations
//! on owned entities take the acting [`Actor`] explicitly; a failed ownership
//! check is reported through the configured [`OwnershipPolicy`].

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::auth::Actor;
use crate::config::OwnershipPolicy;
use crate::errors::AppError;
use crate::lifecycle::TransitionError;
use crate::models::{
    DeveloperMetrics, DisplayStatus, Project, Role, Task, TaskStatus, Todo, User, UserRecord,
};

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(super) pool: SqlitePool,
    pub(super) ownership: OwnershipPolicy,
}

impl Repository {
    pub fn new(pool: SqlitePool, ownership: OwnershipPolicy) -> Self {
        Self { pool, ownership }
    }

    /// Raw pool access for tests that need to rewrite timestamps.
    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Error for an entity that exists but is not the actor's to touch.
    pub(super) fn deny(&self, entity: &str, id: &str) -> AppError {
        self.ownership.deny(entity, id)
    }

    // ==================== SHARED LOOKUPS ====================

    /// Load a project the actor owns or is assigned to.
    pub async fn visible_project(&self, actor: &Actor, id: &str) -> Result<Project, AppError> {
        let mut conn = self.pool.acquire().await?;
        let project = fetch_project(&mut conn, id)
            .await?
            .ok_or_else(|| not_found("Project", id))?;

        if project.is_managed_by(&actor.user_id) || project.has_developer(&actor.user_id) {
            Ok(project)
        } else {
            Err(self.deny("Project", id))
        }
    }

    /// Load a project the actor manages, on the caller's connection or transaction.
    pub(super) async fn owned_project_on(
        &self,
        conn: &mut SqliteConnection,
        actor: &Actor,
        id: &str,
    ) -> Result<Project, AppError> {
        let project = fetch_project(conn, id)
            .await?
            .ok_or_else(|| not_found("Project", id))?;

        if project.is_managed_by(&actor.user_id) {
            Ok(project)
        } else {
            Err(self.deny("Project", id))
        }
    }
}

pub(super) fn not_found(entity: &str, id: &str) -> AppError {
    AppError::NotFound(format!("{} {} not found", entity, id))
}

/// Primary result code SQLite uses for a lost write lock, including the
/// extended BUSY_SNAPSHOT (517) raised when a read snapshot went stale.
const SQLITE_BUSY: i32 = 5;

/// Convert a write that lost the race against a concurrent transaction into
/// a state conflict. Any other database error stays a database error.
pub(super) fn conflict_on_busy(err: sqlx::Error) -> AppError {
    if is_busy(&err) {
        tracing::debug!("write lost to a concurrent transaction: {}", err);
        TransitionError::StateChanged.into()
    } else {
        err.into()
    }
}

fn is_busy(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .and_then(|code| code.parse::<i32>().ok())
        .is_some_and(|code| code & 0xff == SQLITE_BUSY)
}

// Column lists shared by the per-entity queries

pub(super) const USER_COLUMNS: &str =
    "id, email, first_name, last_name, role, is_active, created_at";

pub(super) const USER_RECORD_COLUMNS: &str = "id, email, first_name, last_name, role, is_active, created_at, password_hash, verification_code, verification_code_expiry, reset_code";

pub(super) const PROJECT_COLUMNS: &str = r#"p.id, p.name, p.scope, p.deadline, p.manager_id,
    p.functional_requirements, p.non_functional_requirements,
    p.edited_functional_requirements, p.edited_non_functional_requirements,
    p.created_at, p.updated_at,
    (SELECT json_group_array(pd.developer_id) FROM project_developers pd WHERE pd.project_id = p.id) AS developer_ids"#;

pub(super) const TASK_COLUMNS: &str = r#"t.id, t.project_id, t.title, t.description, t.status,
    t.start_time, t.end_time, t.manager_start_time, t.manager_end_time,
    t.restart_count, t.created_at, t.updated_at, p.manager_id,
    (SELECT json_group_array(td.developer_id) FROM task_developers td WHERE td.task_id = t.id) AS developer_ids"#;

// Fetch helpers usable on a pooled connection or inside a transaction

pub(super) async fn fetch_user(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<User>, AppError> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    Ok(row.as_ref().map(user_from_row))
}

pub(super) async fn fetch_project(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Project>, AppError> {
    let sql = format!("SELECT {} FROM projects p WHERE p.id = ?", PROJECT_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    Ok(row.as_ref().map(project_from_row))
}

/// A task together with the manager of its project.
pub(super) async fn fetch_task(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<(Task, String)>, AppError> {
    let sql = format!(
        "SELECT {} FROM tasks t JOIN projects p ON p.id = t.project_id WHERE t.id = ?",
        TASK_COLUMNS
    );
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    Ok(row.map(|row| (task_from_row(&row), row.get("manager_id"))))
}

/// Check that every id names an existing developer account.
pub(super) async fn ensure_developers(
    conn: &mut SqliteConnection,
    developer_ids: &[String],
) -> Result<(), AppError> {
    for developer_id in developer_ids {
        let role: Option<String> = sqlx::query_scalar("SELECT role FROM users WHERE id = ?")
            .bind(developer_id)
            .fetch_optional(&mut *conn)
            .await?;
        if role.as_deref() != Some(Role::Developer.as_str()) {
            return Err(AppError::validation(format!(
                "User {} is not a developer",
                developer_id
            )));
        }
    }
    Ok(())
}

// Helper functions for row conversion

pub(super) fn user_from_row(row: &SqliteRow) -> User {
    let role: String = row.get("role");
    let is_active: i32 = row.get("is_active");
    User {
        id: row.get("id"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        role: Role::parse(&role).unwrap_or(Role::Developer),
        is_active: is_active != 0,
        created_at: row.get("created_at"),
    }
}

pub(super) fn user_record_from_row(row: &SqliteRow) -> UserRecord {
    UserRecord {
        user: user_from_row(row),
        password_hash: row.get("password_hash"),
        verification_code: row.get("verification_code"),
        verification_code_expiry: row.get("verification_code_expiry"),
        reset_code: row.get("reset_code"),
    }
}

pub(super) fn project_from_row(row: &SqliteRow) -> Project {
    let functional: String = row.get("functional_requirements");
    let non_functional: String = row.get("non_functional_requirements");
    let edited_functional: Option<String> = row.get("edited_functional_requirements");
    let edited_non_functional: Option<String> = row.get("edited_non_functional_requirements");
    let developer_ids: String = row.get("developer_ids");

    Project {
        id: row.get("id"),
        name: row.get("name"),
        scope: row.get("scope"),
        deadline: row.get("deadline"),
        manager_id: row.get("manager_id"),
        developer_ids: parse_json_array(&developer_ids),
        functional_requirements: parse_json_array(&functional),
        non_functional_requirements: parse_json_array(&non_functional),
        edited_functional_requirements: edited_functional.map(|s| parse_json_array(&s)),
        edited_non_functional_requirements: edited_non_functional.map(|s| parse_json_array(&s)),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub(super) fn task_from_row(row: &SqliteRow) -> Task {
    let status: String = row.get("status");
    let developer_ids: String = row.get("developer_ids");
    let start_time: Option<DateTime<Utc>> = row.get("start_time");
    let end_time: Option<DateTime<Utc>> = row.get("end_time");

    let mut task = Task {
        id: row.get("id"),
        project_id: row.get("project_id"),
        title: row.get("title"),
        description: row.get("description"),
        status: TaskStatus::parse(&status).unwrap_or(TaskStatus::NotStarted),
        display_status: DisplayStatus::NotStarted,
        developer_ids: parse_json_array(&developer_ids),
        start_time,
        end_time,
        manager_start_time: row.get("manager_start_time"),
        manager_end_time: row.get("manager_end_time"),
        actual_time_spent_seconds: None,
        restart_count: row.get("restart_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    };
    task.refresh_derived();
    task
}

pub(super) fn todo_from_row(row: &SqliteRow) -> Todo {
    let completed: i32 = row.get("completed");
    Todo {
        id: row.get("id"),
        developer_id: row.get("developer_id"),
        title: row.get("title"),
        completed: completed != 0,
    }
}

pub(super) fn metrics_from_row(row: &SqliteRow) -> DeveloperMetrics {
    DeveloperMetrics {
        developer_id: row.get("developer_id"),
        tasks_completed: row.get("tasks_completed"),
        tasks_reassigned: row.get("tasks_reassigned"),
        average_completion_time: row.get("average_completion_time"),
        total_delivery_time: row.get("total_delivery_time"),
        total_allocated_time: row.get("total_allocated_time"),
    }
}

pub(super) fn parse_json_array(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

pub(super) fn to_json_array(items: &[String]) -> Result<String, AppError> {
    Ok(serde_json::to_string(items)?)
}
