//! Task lifecycle endpoints.

use axum::{
    extract::{Path, State},
    Extension,
};

use super::{success, ApiResult};
use crate::auth::Actor;
use crate::lifecycle::Transition;
use crate::models::{TaskReview, TransitionResponse};
use crate::AppState;

/// POST /api/tasks/{id}/start - Begin work on an assigned task.
pub async fn start_task(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<TransitionResponse> {
    run_transition(&state, &actor, &id, Transition::Start).await
}

/// POST /api/tasks/{id}/complete - Finish an in-progress task.
pub async fn complete_task(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<TransitionResponse> {
    run_transition(&state, &actor, &id, Transition::Complete).await
}

/// POST /api/tasks/{id}/restart - Reopen a completed task.
pub async fn restart_task(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<TransitionResponse> {
    let response = run_transition(&state, &actor, &id, Transition::Restart).await?;

    let task = &response.data.task;
    for developer_id in task.developer_ids.iter().filter(|d| **d != actor.user_id) {
        state.notifications.publish(
            developer_id,
            format!("Task {} has been restarted.", task.title),
        );
    }

    Ok(response)
}

/// GET /api/tasks/{id}/review - Compare a completed task with its allocation.
pub async fn review_task(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> ApiResult<TaskReview> {
    actor.require_manager("review tasks")?;

    let review = state.repo.review_task(&actor, &id).await?;
    success(review)
}

async fn run_transition(
    state: &AppState,
    actor: &Actor,
    id: &str,
    transition: Transition,
) -> ApiResult<TransitionResponse> {
    let task = state.repo.transition_task(actor, id, transition).await?;

    success(TransitionResponse {
        message: transition.success_message().to_string(),
        task,
    })
}
