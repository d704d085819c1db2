use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::activity::{Activity, ActivityPatch},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id", get(show).patch(update))
        .route("/:id/completed", put(set_completed))
}

/// An activity as the API returns it, with the time also in 12-hour form.
#[derive(Debug, Serialize)]
pub struct ActivityView {
    #[serde(flatten)]
    pub activity: Activity,
    pub time_12h: Option<String>,
}

impl From<Activity> for ActivityView {
    fn from(activity: Activity) -> Self {
        Self {
            time_12h: activity.time_12h(),
            activity,
        }
    }
}

async fn show(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ActivityView>, AppError> {
    current.require_user()?;
    let activity = state
        .activities
        .get_by_id(&current, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(activity.into()))
}

async fn update(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(patch): Json<ActivityPatch>,
) -> Result<Json<ActivityView>, AppError> {
    let activity = state.activities.update(&current, &id, patch).await?;
    Ok(Json(activity.into()))
}

#[derive(Deserialize)]
struct CompletedForm {
    completed: bool,
}

async fn set_completed(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(form): Json<CompletedForm>,
) -> Result<StatusCode, AppError> {
    state
        .activities
        .set_completed(&current, &id, form.completed)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
