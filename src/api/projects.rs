//! Project API endpoints.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;

use super::{created, error, require_text, success, ApiResult};
use crate::auth::Actor;
use crate::errors::AppError;
use crate::models::{
    CreateProjectRequest, CreateTaskRequest, DeveloperIdsRequest, EditRequirementsRequest,
    Project, Task, UpdateProjectRequest, User,
};
use crate::requirements;
use crate::AppState;

/// GET /api/projects - Projects the caller manages or works on.
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Vec<Project>> {
    match state.repo.list_projects(&actor).await {
        Ok(projects) => success(projects),
        Err(e) => error(e),
    }
}

/// POST /api/projects - Create a project with drafted requirements.
pub async fn create_project(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateProjectRequest>,
) -> ApiResult<Project> {
    actor.require_manager("create projects")?;
    require_text(&request.name, "Name is required")?;
    if request.deadline <= Utc::now() {
        return error(AppError::validation("Deadline must be in the future."));
    }

    let generated = requirements::generate(&request.scope);

    match state.repo.create_project(&actor, &request, &generated).await {
        Ok(project) => created(project),
        Err(e) => error(e),
    }
}

/// GET /api/projects/{id} - Get a single project.
pub async fn get_project(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<Project> {
    match state.repo.visible_project(&actor, &id).await {
        Ok(project) => success(project),
        Err(e) => error(e),
    }
}

/// PUT /api/projects/{id} - Update a project.
pub async fn update_project(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<UpdateProjectRequest>,
) -> ApiResult<Project> {
    actor.require_manager("update projects")?;
    if let Some(name) = &request.name {
        require_text(name, "Name is required")?;
    }

    match state.repo.update_project(&actor, &id, &request).await {
        Ok(project) => success(project),
        Err(e) => error(e),
    }
}

/// DELETE /api/projects/{id} - Delete a project and its tasks.
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    actor.require_manager("delete projects")?;

    match state.repo.delete_project(&actor, &id).await {
        Ok(()) => success(()),
        Err(e) => error(e),
    }
}

/// GET /api/projects/{id}/developers - Developers on a project.
pub async fn list_project_developers(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<Vec<User>> {
    match state.repo.list_project_developers(&actor, &id).await {
        Ok(developers) => success(developers),
        Err(e) => error(e),
    }
}

/// POST /api/projects/{id}/developers - Assign developers to a project.
pub async fn add_project_developers(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<DeveloperIdsRequest>,
) -> ApiResult<Project> {
    actor.require_manager("assign developers")?;
    if request.developer_ids.is_empty() {
        return error(AppError::validation("No developers provided"));
    }

    let (project, added) = state
        .repo
        .add_project_developers(&actor, &id, &request.developer_ids)
        .await?;

    for developer_id in &added {
        state.notifications.publish(
            developer_id,
            format!("You have been added to project {}.", project.name),
        );
    }

    success(project)
}

/// DELETE /api/projects/{id}/developers/{developer_id} - Remove a developer.
pub async fn remove_project_developer(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((id, developer_id)): Path<(String, String)>,
) -> ApiResult<Project> {
    actor.require_manager("remove developers")?;

    match state
        .repo
        .remove_project_developer(&actor, &id, &developer_id)
        .await
    {
        Ok(project) => success(project),
        Err(e) => error(e),
    }
}

/// PUT /api/projects/{id}/requirements - Save edited requirement lists.
pub async fn edit_requirements(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<EditRequirementsRequest>,
) -> ApiResult<Project> {
    actor.require_manager("edit requirements")?;

    match state.repo.edit_requirements(&actor, &id, &request).await {
        Ok(project) => success(project),
        Err(e) => error(e),
    }
}

/// POST /api/projects/{id}/requirements/accept - Adopt the drafted requirements.
pub async fn accept_requirements(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<Project> {
    actor.require_manager("accept requirements")?;

    match state.repo.accept_requirements(&actor, &id).await {
        Ok(project) => success(project),
        Err(e) => error(e),
    }
}

/// GET /api/projects/{id}/tasks - Tasks of a project.
pub async fn list_project_tasks(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Task>> {
    match state.repo.list_project_tasks(&actor, &id).await {
        Ok(tasks) => success(tasks),
        Err(e) => error(e),
    }
}

/// POST /api/projects/{id}/tasks - Create a task under a project.
pub async fn create_task(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<CreateTaskRequest>,
) -> ApiResult<Task> {
    actor.require_manager("create tasks")?;
    require_text(&request.title, "Title is required")?;

    let task = state.repo.create_task(&actor, &id, &request).await?;

    for developer_id in &task.developer_ids {
        state.notifications.publish(
            developer_id,
            format!("You have been assigned to task {}.", task.title),
        );
    }

    created(task)
}
