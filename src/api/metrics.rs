//! Developer metrics endpoints.

use axum::{extract::State, Extension};

use super::{error, success, ApiResult};
use crate::auth::Actor;
use crate::models::{DeveloperMetrics, DeveloperRating};
use crate::AppState;

/// GET /api/metrics/developers - Ratings of developers on the caller's projects.
pub async fn developer_metrics(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Vec<DeveloperRating>> {
    actor.require_manager("view developer metrics")?;

    match state.repo.developer_ratings(&actor).await {
        Ok(ratings) => success(ratings),
        Err(e) => error(e),
    }
}

/// GET /api/metrics/me - The caller's own metrics record.
pub async fn my_metrics(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<DeveloperMetrics> {
    match state.repo.get_metrics(&actor.user_id).await {
        Ok(metrics) => success(metrics),
        Err(e) => error(e),
    }
}
