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
    models::trip::{NewTrip, Trip, TripPatch, TripRow},
    repositories::locks::TripLocks,
    services::feed::{Change, ChangeFeed, Subscription},
};

const TRIP_COLUMNS: &str = "id, owner_id, destination, description, start_date, end_date, \
     budget, current_spend, status, image_url, created_at, updated_at";

#[derive(Clone)]
pub struct TripRepository {
    db: DbPool,
    feed: ChangeFeed,
    locks: TripLocks,
}

impl TripRepository {
    pub fn new(db: DbPool, feed: ChangeFeed, locks: TripLocks) -> Self {
        Self { db, feed, locks }
    }

    /// The caller's trips, newest first. Empty without a signed-in user.
    pub async fn list_by_owner(&self, current: &CurrentUser) -> Result<Vec<Trip>, AppError> {
        let Some(user) = current.user() else {
            return Ok(Vec::new());
        };
        let rows: Vec<TripRow> = sqlx::query_as(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips WHERE owner_id = ? \
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(&user.id)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(Trip::try_from).collect()
    }

    /// `None` when the trip does not exist or belongs to someone else.
    pub async fn get_by_id(
        &self,
        current: &CurrentUser,
        id: &str,
    ) -> Result<Option<Trip>, AppError> {
        let Some(user) = current.user() else {
            return Ok(None);
        };
        let mut conn = self.db.acquire().await?;
        load_owned(&mut conn, id, &user.id).await
    }

    pub async fn create(&self, current: &CurrentUser, input: NewTrip) -> Result<String, AppError> {
        let user = current.require_user()?;
        let input = input.normalized()?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO trips (id, owner_id, destination, description, start_date, end_date, \
             budget, current_spend, status, image_url, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&user.id)
        .bind(&input.destination)
        .bind(&input.description)
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(input.budget)
        .bind(input.status.as_str())
        .bind(&input.image_url)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await?;

        info!(trip_id = %id, owner_id = %user.id, "trip created");
        self.feed.publish(Change::Trips {
            owner_id: user.id.clone(),
        });
        Ok(id)
    }

    /// Writes the fields present in `patch` and refreshes `updated_at`.
    /// Fields the patch leaves out are not written, so concurrent patches of
    /// different fields both survive. The stored record is re-read and
    /// validated before commit; an invalid result rolls the write back.
    pub async fn update(
        &self,
        current: &CurrentUser,
        id: &str,
        patch: TripPatch,
    ) -> Result<Trip, AppError> {
        let user = current.require_user()?;
        let patch = patch.normalized();
        patch.validate()?;

        let _guard = self.locks.lock(id).await;
        let mut tx = self.db.begin().await?;

        let mut query = QueryBuilder::<Sqlite>::new("UPDATE trips SET ");
        {
            let mut set = query.separated(", ");
            set.push("updated_at = ").push_bind_unseparated(Utc::now());
            if let Some(destination) = &patch.destination {
                set.push("destination = ")
                    .push_bind_unseparated(destination.clone());
            }
            if let Some(description) = &patch.description {
                set.push("description = ")
                    .push_bind_unseparated(description.clone());
            }
            if let Some(start_date) = patch.start_date {
                set.push("start_date = ").push_bind_unseparated(start_date);
            }
            if let Some(end_date) = patch.end_date {
                set.push("end_date = ").push_bind_unseparated(end_date);
            }
            if let Some(budget) = patch.budget {
                set.push("budget = ").push_bind_unseparated(budget);
            }
            if let Some(status) = patch.status {
                set.push("status = ").push_bind_unseparated(status.as_str());
            }
            if let Some(image_url) = patch.stored_image_url() {
                set.push("image_url = ").push_bind_unseparated(image_url);
            }
        }
        query
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND owner_id = ")
            .push_bind(&user.id);
        if query.build().execute(&mut *tx).await?.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }

        let trip = load_owned(&mut tx, id, &user.id)
            .await?
            .ok_or(AppError::NotFound)?;
        trip.validate()?;
        tx.commit().await?;

        debug!(trip_id = %id, "trip updated");
        self.feed.publish(Change::Trips {
            owner_id: user.id.clone(),
        });
        Ok(trip)
    }

    /// Removes the trip together with its activities in one transaction.
    pub async fn delete(&self, current: &CurrentUser, id: &str) -> Result<(), AppError> {
        let user = current.require_user()?;
        let _guard = self.locks.lock(id).await;
        let mut tx = self.db.begin().await?;

        let removed_activities =
            sqlx::query("DELETE FROM activities WHERE trip_id = ? AND owner_id = ?")
                .bind(id)
                .bind(&user.id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        let removed = sqlx::query("DELETE FROM trips WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(&user.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(AppError::NotFound);
        }
        tx.commit().await?;

        info!(trip_id = %id, removed_activities, "trip deleted");
        self.feed.publish(Change::Trips {
            owner_id: user.id.clone(),
        });
        self.feed.publish(Change::Activities {
            trip_id: id.to_string(),
        });
        Ok(())
    }

    /// Writes the derived spend. Only the activity recompute path calls this,
    /// inside the transaction of the triggering activity write.
    pub(crate) async fn set_current_spend(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        amount: f64,
    ) -> Result<(), AppError> {
        let result =
            sqlx::query("UPDATE trips SET current_spend = ?, updated_at = ? WHERE id = ?")
                .bind(amount)
                .bind(Utc::now())
                .bind(id)
                .execute(&mut *conn)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    /// Live version of [`list_by_owner`](Self::list_by_owner).
    pub fn watch_by_owner(&self, current: &CurrentUser) -> Subscription<Vec<Trip>> {
        let owner = current.user().map(|user| user.id.clone());
        let repo = self.clone();
        let current = current.clone();
        Subscription::new(
            &self.feed,
            move |change| {
                matches!((change, &owner), (Change::Trips { owner_id }, Some(wanted)) if owner_id == wanted)
            },
            move || {
                let repo = repo.clone();
                let current = current.clone();
                async move { repo.list_by_owner(&current).await }.boxed()
            },
        )
    }

    /// Live version of [`get_by_id`](Self::get_by_id).
    pub fn watch_by_id(&self, current: &CurrentUser, id: &str) -> Subscription<Option<Trip>> {
        let owner = current.user().map(|user| user.id.clone());
        let repo = self.clone();
        let current = current.clone();
        let id = id.to_string();
        Subscription::new(
            &self.feed,
            move |change| {
                matches!((change, &owner), (Change::Trips { owner_id }, Some(wanted)) if owner_id == wanted)
            },
            move || {
                let repo = repo.clone();
                let current = current.clone();
                let id = id.clone();
                async move { repo.get_by_id(&current, &id).await }.boxed()
            },
        )
    }
}

async fn load_owned(
    conn: &mut SqliteConnection,
    id: &str,
    owner_id: &str,
) -> Result<Option<Trip>, AppError> {
    let row: Option<TripRow> = sqlx::query_as(&format!(
        "SELECT {TRIP_COLUMNS} FROM trips WHERE id = ? AND owner_id = ?"
    ))
    .bind(id)
    .bind(owner_id)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(Trip::try_from).transpose()
}
