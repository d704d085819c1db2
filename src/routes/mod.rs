pub mod activities;
pub mod auth;
pub mod dashboard;
pub mod trips;

use std::convert::Infallible;

use axum::{
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::{services::feed::Subscription, state::AppState};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/auth", auth::router())
        .nest("/api/trips", trips::router())
        .nest("/api/activities", activities::router())
        .route("/api/dashboard", get(dashboard::show))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Streams a live query as server-sent events: one `snapshot` event per
/// result, an `error` event when a re-read fails.
pub(crate) fn live<T>(
    subscription: Subscription<T>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Serialize + Send + 'static,
{
    let events = subscription.into_stream().map(|snapshot| {
        let event = match snapshot {
            Ok(value) => Event::default()
                .event("snapshot")
                .json_data(&value)
                .unwrap_or_else(|err| Event::default().event("error").data(err.to_string())),
            Err(err) => Event::default().event("error").data(err.to_string()),
        };
        Ok(event)
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}
