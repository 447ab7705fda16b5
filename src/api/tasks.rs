//! Task API endpoints.

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use super::{error, require_text, success, ApiResult};
use crate::auth::Actor;
use crate::errors::AppError;
use crate::models::{DeveloperIdsRequest, Task, UpdateTaskRequest};
use crate::AppState;

/// GET /api/tasks - Tasks assigned to the caller, or of the caller's projects.
pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Vec<Task>> {
    match state.repo.list_tasks(&actor).await {
        Ok(tasks) => success(tasks),
        Err(e) => error(e),
    }
}

/// GET /api/tasks/{id} - Get a single task.
pub async fn get_task(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<Task> {
    match state.repo.visible_task(&actor, &id).await {
        Ok(task) => success(task),
        Err(e) => error(e),
    }
}

/// PUT /api/tasks/{id} - Edit a task.
pub async fn update_task(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<UpdateTaskRequest>,
) -> ApiResult<Task> {
    actor.require_manager("edit tasks")?;
    if let Some(title) = &request.title {
        require_text(title, "Title is required")?;
    }

    match state.repo.update_task(&actor, &id, &request).await {
        Ok(task) => success(task),
        Err(e) => error(e),
    }
}

/// DELETE /api/tasks/{id} - Delete a task.
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    actor.require_manager("delete tasks")?;

    match state.repo.delete_task(&actor, &id).await {
        Ok(()) => success(()),
        Err(e) => error(e),
    }
}

/// POST /api/tasks/{id}/developers - Assign project developers to a task.
pub async fn assign_task_developers(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<DeveloperIdsRequest>,
) -> ApiResult<Task> {
    actor.require_manager("assign developers")?;
    if request.developer_ids.is_empty() {
        return error(AppError::validation("No developers provided"));
    }

    let (task, added) = state
        .repo
        .assign_task_developers(&actor, &id, &request.developer_ids)
        .await?;

    for developer_id in &added {
        state.notifications.publish(
            developer_id,
            format!("You have been assigned to task {}.", task.title),
        );
    }

    success(task)
}

/// DELETE /api/tasks/{id}/developers - Remove developers from a task.
pub async fn unassign_task_developers(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<DeveloperIdsRequest>,
) -> ApiResult<Task> {
    actor.require_manager("remove developers")?;

    match state
        .repo
        .unassign_task_developers(&actor, &id, &request.developer_ids)
        .await
    {
        Ok(task) => success(task),
        Err(e) => error(e),
    }
}
