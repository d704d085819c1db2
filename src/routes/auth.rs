use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::PrivateCookieJar;
use serde::Deserialize;

use crate::{
    auth::{self, AuthenticatedUser, CurrentUser, Registration, SESSION_COOKIE},
    error::AppError,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

async fn register(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Json(registration): Json<Registration>,
) -> Result<Response, AppError> {
    let user = auth::register_user(&state, registration).await?;
    let session_id = auth::create_session(&state, &user.id).await?;
    Ok((
        StatusCode::CREATED,
        auth::apply_session_cookie(jar, &session_id),
        Json(user),
    )
        .into_response())
}

#[derive(Deserialize)]
struct LoginForm {
    email: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Json(form): Json<LoginForm>,
) -> Result<Response, AppError> {
    let user = auth::authenticate_user(&state, &form.email, &form.password).await?;
    let session_id = auth::create_session(&state, &user.id).await?;
    Ok((auth::apply_session_cookie(jar, &session_id), Json(user)).into_response())
}

async fn logout(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<Response, AppError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        auth::destroy_session(&state, cookie.value()).await?;
    }
    Ok((auth::clear_session_cookie(jar), StatusCode::NO_CONTENT).into_response())
}

async fn me(current: CurrentUser) -> Result<Json<AuthenticatedUser>, AppError> {
    current.require_user().cloned().map(Json)
}
