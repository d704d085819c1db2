use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::{
        activity::{ActivityCategory, NewActivity},
        trip::{NewTrip, Trip, TripPatch},
    },
    routes::{activities::ActivityView, live},
    services::{
        listing::TripListQuery,
        spend::{category_breakdown, CategoryTotal},
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/stream", get(stream))
        .route("/:id", get(detail).patch(update).delete(remove))
        .route(
            "/:id/activities",
            get(list_activities).post(create_activity),
        )
        .route("/:id/activities/stream", get(stream_activities))
        .route("/:id/activities/:activity_id", delete(remove_activity))
}

async fn list(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<TripListQuery>,
) -> Result<Json<Vec<Trip>>, AppError> {
    current.require_user()?;
    let trips = state.trips.list_by_owner(&current).await?;
    Ok(Json(query.apply(&trips)))
}

async fn create(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(input): Json<NewTrip>,
) -> Result<impl IntoResponse, AppError> {
    let id = state.trips.create(&current, input).await?;
    let trip = state
        .trips
        .get_by_id(&current, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok((StatusCode::CREATED, Json(trip)))
}

async fn stream(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    current.require_user()?;
    Ok(live(state.trips.watch_by_owner(&current)))
}

#[derive(Debug, Serialize)]
struct TripDetail {
    #[serde(flatten)]
    trip: Trip,
    duration_days: i64,
    remaining_budget: f64,
    breakdown: Vec<CategoryTotal>,
    activities: Vec<ActivityView>,
}

async fn detail(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<TripDetail>, AppError> {
    current.require_user()?;
    let trip = state
        .trips
        .get_by_id(&current, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    let activities = state.activities.list_by_trip(&current, &id).await?;
    Ok(Json(TripDetail {
        duration_days: trip.duration_days(),
        remaining_budget: trip.remaining_budget(),
        breakdown: category_breakdown(&activities),
        activities: activities.into_iter().map(ActivityView::from).collect(),
        trip,
    }))
}

async fn update(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(patch): Json<TripPatch>,
) -> Result<Json<Trip>, AppError> {
    state.trips.update(&current, &id, patch).await.map(Json)
}

async fn remove(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.trips.delete(&current, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_activities(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<ActivityView>>, AppError> {
    current.require_user()?;
    let activities = state.activities.list_by_trip(&current, &id).await?;
    Ok(Json(activities.into_iter().map(ActivityView::from).collect()))
}

/// Body of an activity created under a trip; the trip comes from the path.
#[derive(Deserialize)]
struct ActivityForm {
    name: String,
    description: String,
    date: NaiveDate,
    time: String,
    cost: f64,
    #[serde(default)]
    category: ActivityCategory,
}

async fn create_activity(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    Json(form): Json<ActivityForm>,
) -> Result<impl IntoResponse, AppError> {
    let input = NewActivity {
        trip_id,
        name: form.name,
        description: form.description,
        date: form.date,
        time: form.time,
        cost: form.cost,
        category: form.category,
    };
    let id = state.activities.create(&current, input).await?;
    let activity = state
        .activities
        .get_by_id(&current, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok((StatusCode::CREATED, Json(ActivityView::from(activity))))
}

async fn stream_activities(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    current.require_user()?;
    Ok(live(state.activities.watch_by_trip(&current, &id)))
}

async fn remove_activity(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((trip_id, activity_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state
        .activities
        .delete(&current, &activity_id, &trip_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
