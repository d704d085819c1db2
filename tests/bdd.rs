use std::{collections::HashMap, fmt, fs::File, net::SocketAddr};

use anyhow::Context;
use chrono::NaiveDate;
use cucumber::{given, then, when, World as _};
use tempfile::TempDir;
use viajes::{
    auth::{self, CurrentUser, Registration},
    config::AppConfig,
    db::{init_pool, run_migrations},
    error::AppError,
    models::{
        activity::{ActivityCategory, NewActivity},
        trip::{NewTrip, TripStatus},
    },
    state::AppState,
};

#[derive(Debug, cucumber::World, Default)]
struct AppWorld {
    state: Option<TestState>,
    current: CurrentUser,
    trips: HashMap<String, String>,
    activities: HashMap<String, String>,
    last_error: Option<AppError>,
}

impl AppWorld {
    fn app_state(&self) -> &AppState {
        self.state
            .as_ref()
            .expect("state must be initialised first")
            .app()
    }

    fn trip_id(&self, destination: &str) -> &str {
        self.trips
            .get(destination)
            .unwrap_or_else(|| panic!("no trip to {destination} was created"))
    }

    fn activity_id(&self, name: &str) -> &str {
        self.activities
            .get(name)
            .unwrap_or_else(|| panic!("no activity {name} was created"))
    }

    async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.app_state().db)
            .await
            .expect("count rows")
    }
}

struct TestState {
    app: AppState,
    _root: TempDir,
}

impl fmt::Debug for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestState").finish()
    }
}

impl TestState {
    async fn new() -> anyhow::Result<Self> {
        let root = TempDir::new().context("create temp dir for bdd world")?;
        let db_path = root.path().join("bdd.sqlite");
        File::create(&db_path)?;
        let database_url = format!("sqlite://{}", db_path.to_string_lossy());

        let config = AppConfig {
            database_url,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            cookie_secret: "bdd-cookie-secret".into(),
            session_ttl_hours: 1,
        };

        let db = init_pool(&config.database_url).await?;
        run_migrations(&db).await?;

        let app = AppState::new(config, db);
        Ok(Self { app, _root: root })
    }

    fn app(&self) -> &AppState {
        &self.app
    }
}

fn trip_to(destination: &str, budget: f64) -> NewTrip {
    NewTrip {
        destination: destination.to_string(),
        description: format!("A week in {destination}"),
        start_date: NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date"),
        end_date: NaiveDate::from_ymd_opt(2025, 6, 8).expect("valid date"),
        budget,
        status: TripStatus::Planned,
        image_url: None,
    }
}

#[given("a fresh application state")]
async fn given_fresh_state(world: &mut AppWorld) {
    world.state = Some(TestState::new().await.expect("state"));
    world.current = CurrentUser::anonymous();
    world.trips.clear();
    world.activities.clear();
    world.last_error = None;
}

#[given(regex = r#"^a registered user with email "([^"]+)" and password "([^"]+)"$"#)]
async fn given_registered_user(world: &mut AppWorld, email: String, password: String) {
    let state = world.app_state();
    let registration = Registration::new(email.as_str(), password.as_str(), password.as_str());
    auth::register_user(state, registration)
        .await
        .expect("register user");
    let user = auth::authenticate_user(state, &email, &password)
        .await
        .expect("authenticate");
    world.current = CurrentUser::signed_in(user);
}

#[when(regex = r#"^I create a trip to "([^"]+)" with budget (\d+(?:\.\d+)?)$"#)]
async fn when_create_trip(world: &mut AppWorld, destination: String, budget: f64) {
    let id = world
        .app_state()
        .trips
        .create(&world.current, trip_to(&destination, budget))
        .await
        .expect("create trip");
    world.trips.insert(destination, id);
}

#[when(regex = r#"^I add an activity "([^"]+)" costing (\d+(?:\.\d+)?) to "([^"]+)"$"#)]
async fn when_add_activity(world: &mut AppWorld, name: String, cost: f64, destination: String) {
    let input = NewActivity {
        trip_id: world.trip_id(&destination).to_string(),
        name: name.clone(),
        description: format!("{name} during the trip"),
        date: NaiveDate::from_ymd_opt(2025, 6, 2).expect("valid date"),
        time: "10:00".into(),
        cost,
        category: ActivityCategory::Entertainment,
    };
    let id = world
        .app_state()
        .activities
        .create(&world.current, input)
        .await
        .expect("create activity");
    world.activities.insert(name, id);
}

#[when(regex = r#"^I delete the activity "([^"]+)" from "([^"]+)"$"#)]
async fn when_delete_activity(world: &mut AppWorld, name: String, destination: String) {
    world
        .app_state()
        .activities
        .delete(
            &world.current,
            world.activity_id(&name),
            world.trip_id(&destination),
        )
        .await
        .expect("delete activity");
}

#[when(regex = r#"^I mark the activity "([^"]+)" as completed$"#)]
async fn when_complete_activity(world: &mut AppWorld, name: String) {
    world
        .app_state()
        .activities
        .set_completed(&world.current, world.activity_id(&name), true)
        .await
        .expect("complete activity");
}

#[when(regex = r#"^I delete the trip "([^"]+)"$"#)]
async fn when_delete_trip(world: &mut AppWorld, destination: String) {
    world
        .app_state()
        .trips
        .delete(&world.current, world.trip_id(&destination))
        .await
        .expect("delete trip");
}

#[when(regex = r#"^an anonymous caller tries to create a trip to "([^"]+)"$"#)]
async fn when_anonymous_create(world: &mut AppWorld, destination: String) {
    let result = world
        .app_state()
        .trips
        .create(&CurrentUser::anonymous(), trip_to(&destination, 100.0))
        .await;
    world.last_error = result.err();
}

#[then(regex = r#"^the trip "([^"]+)" has spend (\d+(?:\.\d+)?)$"#)]
async fn then_trip_spend(world: &mut AppWorld, destination: String, expected: f64) {
    let trip = world
        .app_state()
        .trips
        .get_by_id(&world.current, world.trip_id(&destination))
        .await
        .expect("load trip")
        .expect("trip exists");
    assert_eq!(trip.current_spend, expected);
}

#[then(regex = r#"^the trip "([^"]+)" has (\d+) activities$"#)]
async fn then_trip_activity_count(world: &mut AppWorld, destination: String, expected: usize) {
    let activities = world
        .app_state()
        .activities
        .list_by_trip(&world.current, world.trip_id(&destination))
        .await
        .expect("list activities");
    assert_eq!(activities.len(), expected);
}

#[then("no activities are stored")]
async fn then_no_activities(world: &mut AppWorld) {
    assert_eq!(world.count("activities").await, 0);
}

#[then("no trips are stored")]
async fn then_no_trips(world: &mut AppWorld) {
    assert_eq!(world.count("trips").await, 0);
}

#[then("the attempt is rejected as unauthenticated")]
async fn then_unauthenticated(world: &mut AppWorld) {
    assert!(matches!(world.last_error, Some(AppError::Unauthenticated)));
}

#[tokio::main]
async fn main() {
    AppWorld::cucumber()
        .fail_on_skipped()
        .with_default_cli()
        .run("tests/features")
        .await;
}
