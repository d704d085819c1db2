use axum::{extract::State, Json};
use chrono::Local;

use crate::{auth::CurrentUser, error::AppError, services::dashboard::Dashboard, state::AppState};

pub async fn show(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Dashboard>, AppError> {
    current.require_user()?;
    let trips = state.trips.list_by_owner(&current).await?;
    Ok(Json(Dashboard::build(&trips, Local::now().date_naive())))
}
