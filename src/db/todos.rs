use chrono::Utc;

use super::repository::{todo_from_row, Repository};
use crate::auth::Actor;
use crate::errors::AppError;
use crate::models::{CreateTodoRequest, Todo, UpdateTodoRequest};

impl Repository {
    // ==================== TODO OPERATIONS ====================

    /// List the actor's to-do items.
    pub async fn list_todos(&self, actor: &Actor) -> Result<Vec<Todo>, AppError> {
        let rows = sqlx::query(
            "SELECT id, developer_id, title, completed FROM todos WHERE developer_id = ? ORDER BY created_at",
        )
        .bind(&actor.user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(todo_from_row).collect())
    }

    /// Get one of the actor's to-do items. Items of other users are not found.
    pub async fn get_todo(&self, actor: &Actor, id: &str) -> Result<Todo, AppError> {
        let row = sqlx::query(
            "SELECT id, developer_id, title, completed FROM todos WHERE id = ? AND developer_id = ?",
        )
        .bind(id)
        .bind(&actor.user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref()
            .map(todo_from_row)
            .ok_or_else(|| AppError::NotFound(format!("Todo {} not found", id)))
    }

    pub async fn create_todo(
        &self,
        actor: &Actor,
        request: &CreateTodoRequest,
    ) -> Result<Todo, AppError> {
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO todos (id, developer_id, title, completed, created_at) VALUES (?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(&actor.user_id)
        .bind(request.title.trim())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(Todo {
            id,
            developer_id: actor.user_id.clone(),
            title: request.title.trim().to_string(),
            completed: false,
        })
    }

    pub async fn update_todo(
        &self,
        actor: &Actor,
        id: &str,
        request: &UpdateTodoRequest,
    ) -> Result<Todo, AppError> {
        let existing = self.get_todo(actor, id).await?;

        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .unwrap_or(&existing.title)
            .to_string();
        let completed = request.completed.unwrap_or(existing.completed);

        sqlx::query("UPDATE todos SET title = ?, completed = ? WHERE id = ? AND developer_id = ?")
            .bind(&title)
            .bind(completed as i32)
            .bind(id)
            .bind(&actor.user_id)
            .execute(&self.pool)
            .await?;

        Ok(Todo {
            title,
            completed,
            ..existing
        })
    }

    pub async fn delete_todo(&self, actor: &Actor, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM todos WHERE id = ? AND developer_id = ?")
            .bind(id)
            .bind(&actor.user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Todo {} not found", id)));
        }
        Ok(())
    }
}
