use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use sha2::{Digest, Sha512};

use crate::{
    config::AppConfig,
    db::DbPool,
    repositories::{ActivityRepository, TripLocks, TripRepository},
    services::feed::ChangeFeed,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DbPool,
    pub cookie_key: Key,
    pub feed: ChangeFeed,
    pub trips: TripRepository,
    pub activities: ActivityRepository,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool) -> Self {
        let digest = Sha512::digest(config.cookie_secret.as_bytes());
        let cookie_key = Key::from(&digest[..]);

        let feed = ChangeFeed::new();
        let locks = TripLocks::new();
        let trips = TripRepository::new(db.clone(), feed.clone(), locks.clone());
        let activities = ActivityRepository::new(db.clone(), feed.clone(), locks, trips.clone());

        Self {
            config,
            db,
            cookie_key,
            feed,
            trips,
            activities,
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}
