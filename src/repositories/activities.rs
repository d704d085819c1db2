use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use futures::FutureExt;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::CurrentUser,
    db::DbPool,
    error::AppError,
    models::activity::{Activity, ActivityPatch, ActivityRow, NewActivity},
    repositories::{
        locks::{TripGuard, TripLocks},
        trips::TripRepository,
    },
    services::{
        feed::{Change, ChangeFeed, Subscription},
        spend::total_cost,
    },
};

const ACTIVITY_COLUMNS: &str = "id, trip_id, owner_id, name, description, date, time, cost, \
     category, completed, created_at";

const ACTIVITY_ORDER: &str = "ORDER BY date ASC, time ASC, created_at ASC, rowid ASC";

/// Every write transaction here starts with its write statement, so SQLite
/// takes the write lock before the transaction has read anything.
#[derive(Clone)]
pub struct ActivityRepository {
    db: DbPool,
    feed: ChangeFeed,
    locks: TripLocks,
    trips: TripRepository,
}

impl ActivityRepository {
    pub fn new(db: DbPool, feed: ChangeFeed, locks: TripLocks, trips: TripRepository) -> Self {
        Self {
            db,
            feed,
            locks,
            trips,
        }
    }

    /// Activities of one of the caller's trips, earliest first.
    pub async fn list_by_trip(
        &self,
        current: &CurrentUser,
        trip_id: &str,
    ) -> Result<Vec<Activity>, AppError> {
        let Some(user) = current.user() else {
            return Ok(Vec::new());
        };
        let rows: Vec<ActivityRow> = sqlx::query_as(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities \
             WHERE trip_id = ? AND owner_id = ? {ACTIVITY_ORDER}"
        ))
        .bind(trip_id)
        .bind(&user.id)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(Activity::try_from).collect()
    }

    pub async fn get_by_id(
        &self,
        current: &CurrentUser,
        id: &str,
    ) -> Result<Option<Activity>, AppError> {
        let Some(user) = current.user() else {
            return Ok(None);
        };
        let mut conn = self.db.acquire().await?;
        load_owned(&mut conn, id, &user.id).await
    }

    /// Stores a new activity and recomputes its trip's spend in the same
    /// transaction. The insert only happens when the caller owns the trip.
    pub async fn create(
        &self,
        current: &CurrentUser,
        input: NewActivity,
    ) -> Result<String, AppError> {
        let user = current.require_user()?;
        let input = input.normalized()?;
        let id = Uuid::new_v4().to_string();

        let _guard = self.locks.lock(&input.trip_id).await;
        let mut tx = self.db.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO activities (id, trip_id, owner_id, name, description, date, time, \
             cost, category, completed, created_at) \
             SELECT ?, id, owner_id, ?, ?, ?, ?, ?, ?, 0, ? \
             FROM trips WHERE id = ? AND owner_id = ?",
        )
        .bind(&id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.date)
        .bind(&input.time)
        .bind(input.cost)
        .bind(input.category.as_str())
        .bind(Utc::now())
        .bind(&input.trip_id)
        .bind(&user.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if inserted == 0 {
            return Err(AppError::NotFound);
        }

        let spend = self.recompute(&mut tx, &input.trip_id).await?;
        tx.commit().await?;

        info!(activity_id = %id, trip_id = %input.trip_id, spend, "activity created");
        self.announce(&user.id, [input.trip_id.as_str()]);
        Ok(id)
    }

    /// Writes the fields present in `patch`. The activity's current trip,
    /// and the target trip of a move, stay locked from before the write until
    /// commit; both are recomputed when cost or trip changed. The stored
    /// record is re-read and validated before commit.
    pub async fn update(
        &self,
        current: &CurrentUser,
        id: &str,
        patch: ActivityPatch,
    ) -> Result<Activity, AppError> {
        let user = current.require_user()?;
        let patch = patch.normalized();
        patch.validate()?;

        let (stored_trip, _guards) = self
            .lock_activity_trips(&user.id, id, patch.trip_id.as_deref())
            .await?;
        let previous_trip = stored_trip.ok_or(AppError::NotFound)?;

        let mut tx = self.db.begin().await?;

        let mut query = QueryBuilder::<Sqlite>::new("UPDATE activities SET ");
        {
            let mut set = query.separated(", ");
            // Keeps the statement well-formed for an empty patch.
            set.push("id = id");
            if let Some(trip_id) = &patch.trip_id {
                set.push("trip_id = ").push_bind_unseparated(trip_id.clone());
            }
            if let Some(name) = &patch.name {
                set.push("name = ").push_bind_unseparated(name.clone());
            }
            if let Some(description) = &patch.description {
                set.push("description = ")
                    .push_bind_unseparated(description.clone());
            }
            if let Some(date) = patch.date {
                set.push("date = ").push_bind_unseparated(date);
            }
            if let Some(time) = &patch.time {
                set.push("time = ").push_bind_unseparated(time.clone());
            }
            if let Some(cost) = patch.cost {
                set.push("cost = ").push_bind_unseparated(cost);
            }
            if let Some(category) = patch.category {
                set.push("category = ")
                    .push_bind_unseparated(category.as_str());
            }
        }
        query
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND owner_id = ")
            .push_bind(&user.id);
        if let Some(target) = &patch.trip_id {
            query
                .push(" AND EXISTS (SELECT 1 FROM trips WHERE id = ")
                .push_bind(target.clone())
                .push(" AND owner_id = ")
                .push_bind(&user.id)
                .push(")");
        }
        if query.build().execute(&mut *tx).await?.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }

        let activity = load_owned(&mut tx, id, &user.id)
            .await?
            .ok_or(AppError::NotFound)?;
        activity.validate()?;

        let mut affected = vec![previous_trip.as_str()];
        if activity.trip_id != previous_trip {
            affected.push(activity.trip_id.as_str());
        }
        if patch.touches_spend() {
            for trip_id in &affected {
                self.recompute(&mut tx, trip_id).await?;
            }
        }
        tx.commit().await?;

        debug!(activity_id = %id, trips = affected.len(), "activity updated");
        self.announce(&user.id, affected);
        Ok(activity)
    }

    /// Deletes the activity, then recomputes `trip_id`. The trip comes from
    /// the caller, so an activity that is already gone still succeeds and
    /// still refreshes the aggregate. When the activity actually sits under
    /// another trip, that trip is recomputed as well.
    pub async fn delete(
        &self,
        current: &CurrentUser,
        id: &str,
        trip_id: &str,
    ) -> Result<(), AppError> {
        let user = current.require_user()?;
        let (stored_trip, _guards) = self
            .lock_activity_trips(&user.id, id, Some(trip_id))
            .await?;
        let mut tx = self.db.begin().await?;

        let removed = sqlx::query("DELETE FROM activities WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(&user.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed == 0 {
            debug!(activity_id = %id, "activity already gone");
        }
        ensure_trip_owned(&mut tx, trip_id, &user.id).await?;

        let mut affected = vec![trip_id];
        if let Some(stored) = stored_trip.as_deref().filter(|stored| *stored != trip_id) {
            affected.push(stored);
        }
        let mut spend = 0.0;
        for affected_trip in &affected {
            let total = self.recompute(&mut tx, affected_trip).await?;
            if *affected_trip == trip_id {
                spend = total;
            }
        }
        tx.commit().await?;

        info!(activity_id = %id, trip_id = %trip_id, spend, "activity deleted");
        self.announce(&user.id, affected);
        Ok(())
    }

    /// Flips the completed flag. Cost is untouched, so no recompute.
    pub async fn set_completed(
        &self,
        current: &CurrentUser,
        id: &str,
        completed: bool,
    ) -> Result<(), AppError> {
        let user = current.require_user()?;
        let trip_id: Option<String> = sqlx::query_scalar(
            "UPDATE activities SET completed = ? WHERE id = ? AND owner_id = ? RETURNING trip_id",
        )
        .bind(completed)
        .bind(id)
        .bind(&user.id)
        .fetch_optional(&self.db)
        .await?;
        let trip_id = trip_id.ok_or(AppError::NotFound)?;

        debug!(activity_id = %id, completed, "activity completion changed");
        self.feed.publish(Change::Activities { trip_id });
        Ok(())
    }

    /// Locks the trip the activity is stored under together with `extra`.
    /// A concurrent move can change the stored trip while we wait, so the
    /// lookup is repeated under the locks until it is stable. Returns the
    /// stored trip, `None` when the activity does not exist.
    async fn lock_activity_trips(
        &self,
        owner_id: &str,
        id: &str,
        extra: Option<&str>,
    ) -> Result<(Option<String>, Vec<TripGuard>), AppError> {
        loop {
            let stored = self.stored_trip(owner_id, id).await?;
            let trip_ids: Vec<&str> = stored.as_deref().into_iter().chain(extra).collect();
            let guards = self.locks.lock_all(&trip_ids).await;
            if self.stored_trip(owner_id, id).await? == stored {
                return Ok((stored, guards));
            }
            debug!(activity_id = %id, "activity moved while locking, retrying");
        }
    }

    async fn stored_trip(&self, owner_id: &str, id: &str) -> Result<Option<String>, AppError> {
        let trip_id = sqlx::query_scalar("SELECT trip_id FROM activities WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(trip_id)
    }

    /// Re-reads the trip's activities on the open transaction and stores
    /// their summed cost as the trip's current spend.
    async fn recompute(&self, conn: &mut SqliteConnection, trip_id: &str) -> Result<f64, AppError> {
        let rows: Vec<ActivityRow> = sqlx::query_as(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE trip_id = ? {ACTIVITY_ORDER}"
        ))
        .bind(trip_id)
        .fetch_all(&mut *conn)
        .await?;
        let activities = rows
            .into_iter()
            .map(Activity::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let spend = total_cost(&activities);
        self.trips.set_current_spend(conn, trip_id, spend).await?;
        debug!(trip_id = %trip_id, activities = activities.len(), spend, "trip spend recomputed");
        Ok(spend)
    }

    fn announce<'a>(&self, owner_id: &str, trip_ids: impl IntoIterator<Item = &'a str>) {
        for trip_id in trip_ids {
            self.feed.publish(Change::Activities {
                trip_id: trip_id.to_string(),
            });
        }
        self.feed.publish(Change::Trips {
            owner_id: owner_id.to_string(),
        });
    }

    /// Live version of [`list_by_trip`](Self::list_by_trip).
    pub fn watch_by_trip(&self, current: &CurrentUser, trip_id: &str) -> Subscription<Vec<Activity>> {
        let repo = self.clone();
        let current = current.clone();
        let watched = trip_id.to_string();
        let trip_id = trip_id.to_string();
        Subscription::new(
            &self.feed,
            move |change| matches!(change, Change::Activities { trip_id } if *trip_id == watched),
            move || {
                let repo = repo.clone();
                let current = current.clone();
                let trip_id = trip_id.clone();
                async move { repo.list_by_trip(&current, &trip_id).await }.boxed()
            },
        )
    }

    /// Live version of [`get_by_id`](Self::get_by_id). Reloads on changes to
    /// the trip the activity was under at the last load; a move publishes
    /// for both trips, so the new trip is picked up on that reload.
    pub fn watch_by_id(&self, current: &CurrentUser, id: &str) -> Subscription<Option<Activity>> {
        let repo = self.clone();
        let current = current.clone();
        let id = id.to_string();
        let last_trip: Arc<Mutex<Option<String>>> = Arc::default();
        let seen = last_trip.clone();
        Subscription::new(
            &self.feed,
            move |change| {
                let last = seen.lock().unwrap_or_else(PoisonError::into_inner);
                matches!(
                    (change, last.as_deref()),
                    (Change::Activities { trip_id }, Some(watched)) if trip_id == watched
                )
            },
            move || {
                let repo = repo.clone();
                let current = current.clone();
                let id = id.clone();
                let last_trip = last_trip.clone();
                async move {
                    let activity = repo.get_by_id(&current, &id).await?;
                    *last_trip.lock().unwrap_or_else(PoisonError::into_inner) =
                        activity.as_ref().map(|activity| activity.trip_id.clone());
                    Ok::<_, AppError>(activity)
                }
                .boxed()
            },
        )
    }
}

async fn load_owned(
    conn: &mut SqliteConnection,
    id: &str,
    owner_id: &str,
) -> Result<Option<Activity>, AppError> {
    let row: Option<ActivityRow> = sqlx::query_as(&format!(
        "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = ? AND owner_id = ?"
    ))
    .bind(id)
    .bind(owner_id)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(Activity::try_from).transpose()
}

async fn ensure_trip_owned(
    conn: &mut SqliteConnection,
    trip_id: &str,
    owner_id: &str,
) -> Result<(), AppError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM trips WHERE id = ? AND owner_id = ?")
        .bind(trip_id)
        .bind(owner_id)
        .fetch_optional(&mut *conn)
        .await?;
    found.map(|_| ()).ok_or(AppError::NotFound)
}
