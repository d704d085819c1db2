use std::net::SocketAddr;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use viajes::{
    config::AppConfig,
    db::{init_pool, run_migrations},
    routes::create_router,
    state::AppState,
};

struct TestApp {
    router: Router,
    _root: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let root = TempDir::new().unwrap();
        let database_url = format!("sqlite://{}", root.path().join("api.sqlite").display());
        let config = AppConfig {
            database_url,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            cookie_secret: "api-test-cookie-secret".into(),
            session_ttl_hours: 1,
        };
        let db = init_pool(&config.database_url).await.unwrap();
        run_migrations(&db).await.unwrap();
        Self {
            router: create_router(AppState::new(config, db)),
            _root: root,
        }
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Option<String>, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(str::to_string);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, set_cookie, json)
    }

    /// Registers a user and returns the session cookie to send back.
    async fn register(&self, email: &str) -> String {
        let (status, cookie, body) = self
            .send(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "email": email,
                    "password": "secret1",
                    "password_confirm": "secret1",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["email"], email);
        cookie.expect("register sets the session cookie")
    }

    async fn create_trip(&self, cookie: &str, destination: &str, budget: f64) -> String {
        let (status, _, body) = self
            .send(
                Method::POST,
                "/api/trips",
                Some(cookie),
                Some(json!({
                    "destination": destination,
                    "description": format!("A week in {destination}"),
                    "start_date": "2025-06-01",
                    "end_date": "2025-06-10",
                    "budget": budget,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    async fn add_activity(&self, cookie: &str, trip_id: &str, name: &str, cost: f64) -> Value {
        let (status, _, body) = self
            .send(
                Method::POST,
                &format!("/api/trips/{trip_id}/activities"),
                Some(cookie),
                Some(json!({
                    "name": name,
                    "description": format!("{name} in the evening"),
                    "date": "2025-06-02",
                    "time": "07:30 PM",
                    "cost": cost,
                    "category": "entertainment",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new().await;
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn api_requires_a_session() {
    let app = TestApp::new().await;
    for uri in ["/api/trips", "/api/dashboard", "/api/auth/me"] {
        let (status, _, body) = app.send(Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["error"], "unauthenticated");
    }
}

#[tokio::test]
async fn spend_tracks_activity_changes_over_http() {
    let app = TestApp::new().await;
    let cookie = app.register("ana@example.com").await;
    let trip_id = app.create_trip(&cookie, "Paris", 1000.0).await;

    let cruise = app.add_activity(&cookie, &trip_id, "Seine cruise", 100.0).await;
    assert_eq!(cruise["time"], "19:30");
    assert_eq!(cruise["time_12h"], "07:30 PM");
    assert_eq!(cruise["completed"], false);
    app.add_activity(&cookie, &trip_id, "Opera night", 250.0).await;

    let (status, _, detail) = app
        .send(Method::GET, &format!("/api/trips/{trip_id}"), Some(&cookie), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["current_spend"], 350.0);
    assert_eq!(detail["remaining_budget"], 650.0);
    assert_eq!(detail["duration_days"], 9);
    assert_eq!(detail["activities"].as_array().unwrap().len(), 2);
    assert_eq!(detail["breakdown"][0]["category"], "entertainment");
    assert_eq!(detail["breakdown"][0]["total"], 350.0);

    let cruise_id = cruise["id"].as_str().unwrap();
    let (status, _, _) = app
        .send(
            Method::DELETE,
            &format!("/api/trips/{trip_id}/activities/{cruise_id}"),
            Some(&cookie),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, _, detail) = app
        .send(Method::GET, &format!("/api/trips/{trip_id}"), Some(&cookie), None)
        .await;
    assert_eq!(detail["current_spend"], 250.0);

    let (status, _, dashboard) = app
        .send(Method::GET, "/api/dashboard", Some(&cookie), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["stats"]["total_trips"], 1);
    assert_eq!(dashboard["stats"]["total_spend"], 250.0);
    assert_eq!(dashboard["stats"]["percent_spent"], 25.0);
}

#[tokio::test]
async fn completion_and_trip_status_updates() {
    let app = TestApp::new().await;
    let cookie = app.register("ana@example.com").await;
    let trip_id = app.create_trip(&cookie, "Lisbon", 600.0).await;
    let tram = app.add_activity(&cookie, &trip_id, "Tram 28", 3.0).await;
    let tram_id = tram["id"].as_str().unwrap();

    let (status, _, _) = app
        .send(
            Method::PUT,
            &format!("/api/activities/{tram_id}/completed"),
            Some(&cookie),
            Some(json!({ "completed": true })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, _, activity) = app
        .send(Method::GET, &format!("/api/activities/{tram_id}"), Some(&cookie), None)
        .await;
    assert_eq!(activity["completed"], true);

    let (status, _, trip) = app
        .send(
            Method::PATCH,
            &format!("/api/trips/{trip_id}"),
            Some(&cookie),
            Some(json!({ "status": "in-progress" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trip["status"], "in-progress");
    assert_eq!(trip["current_spend"], 3.0);
}

#[tokio::test]
async fn list_filters_and_sorts() {
    let app = TestApp::new().await;
    let cookie = app.register("ana@example.com").await;
    app.create_trip(&cookie, "Paris", 100.0).await;
    app.create_trip(&cookie, "Porto", 500.0).await;
    app.create_trip(&cookie, "Berlin", 250.0).await;

    let (status, _, trips) = app
        .send(Method::GET, "/api/trips?sort=budget-desc", Some(&cookie), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let budgets: Vec<f64> = trips
        .as_array()
        .unwrap()
        .iter()
        .map(|trip| trip["budget"].as_f64().unwrap())
        .collect();
    assert_eq!(budgets, [500.0, 250.0, 100.0]);

    let (_, _, trips) = app
        .send(
            Method::GET,
            "/api/trips?search=p&status=planned&sort=destination-asc",
            Some(&cookie),
            None,
        )
        .await;
    let names: Vec<&str> = trips
        .as_array()
        .unwrap()
        .iter()
        .map(|trip| trip["destination"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["Paris", "Porto"]);
}

#[tokio::test]
async fn invalid_input_is_rejected_with_422() {
    let app = TestApp::new().await;
    let cookie = app.register("ana@example.com").await;
    let (status, _, body) = app
        .send(
            Method::POST,
            "/api/trips",
            Some(&cookie),
            Some(json!({
                "destination": "Ro",
                "description": "short",
                "start_date": "2025-06-10",
                "end_date": "2025-06-01",
                "budget": -5.0,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation");

    let (_, _, trips) = app.send(Method::GET, "/api/trips", Some(&cookie), None).await;
    assert!(trips.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn other_users_records_are_not_found() {
    let app = TestApp::new().await;
    let ana = app.register("ana@example.com").await;
    let bo = app.register("bo@example.com").await;
    let trip_id = app.create_trip(&ana, "Paris", 1000.0).await;

    let (status, _, _) = app
        .send(Method::GET, &format!("/api/trips/{trip_id}"), Some(&bo), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = app
        .send(Method::DELETE, &format!("/api/trips/{trip_id}"), Some(&bo), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, _, trips) = app.send(Method::GET, "/api/trips", Some(&bo), None).await;
    assert!(trips.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn login_and_logout() {
    let app = TestApp::new().await;
    app.register("ana@example.com").await;

    let (status, _, _) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "ana@example.com", "password": "nope!!" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, cookie, _) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "ana@example.com", "password": "secret1" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let cookie = cookie.unwrap();

    let (status, _, me) = app
        .send(Method::GET, "/api/auth/me", Some(&cookie), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "ana@example.com");

    let (status, _, _) = app
        .send(Method::POST, "/api/auth/logout", Some(&cookie), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = app
        .send(Method::GET, "/api/auth/me", Some(&cookie), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
