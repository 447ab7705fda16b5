//! To-do API endpoints.

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use super::{created, error, require_text, success, ApiResult};
use crate::auth::Actor;
use crate::models::{CreateTodoRequest, Todo, UpdateTodoRequest};
use crate::AppState;

/// GET /api/todos - List the caller's to-do items.
pub async fn list_todos(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Vec<Todo>> {
    match state.repo.list_todos(&actor).await {
        Ok(todos) => success(todos),
        Err(e) => error(e),
    }
}

/// POST /api/todos - Create a to-do item.
pub async fn create_todo(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateTodoRequest>,
) -> ApiResult<Todo> {
    require_text(&request.title, "Title is required")?;

    match state.repo.create_todo(&actor, &request).await {
        Ok(todo) => created(todo),
        Err(e) => error(e),
    }
}

/// GET /api/todos/{id} - Get a to-do item.
pub async fn get_todo(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<Todo> {
    match state.repo.get_todo(&actor, &id).await {
        Ok(todo) => success(todo),
        Err(e) => error(e),
    }
}

/// PUT /api/todos/{id} - Update a to-do item.
pub async fn update_todo(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<UpdateTodoRequest>,
) -> ApiResult<Todo> {
    if let Some(title) = &request.title {
        require_text(title, "Title is required")?;
    }

    match state.repo.update_todo(&actor, &id, &request).await {
        Ok(todo) => success(todo),
        Err(e) => error(e),
    }
}

/// DELETE /api/todos/{id} - Delete a to-do item.
pub async fn delete_todo(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    match state.repo.delete_todo(&actor, &id).await {
        Ok(()) => success(()),
        Err(e) => error(e),
    }
}
