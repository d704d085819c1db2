use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

use crate::{
    error::AppError,
    validation::{normalize_optional, validate_http_scheme, validate_non_negative},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TripStatus {
    #[default]
    Planned,
    InProgress,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub const ALL: [TripStatus; 4] = [
        TripStatus::Planned,
        TripStatus::InProgress,
        TripStatus::Completed,
        TripStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Planned => "planned",
            TripStatus::InProgress => "in-progress",
            TripStatus::Completed => "completed",
            TripStatus::Cancelled => "cancelled",
        }
    }

    /// Finished trips no longer count as upcoming.
    pub fn is_closed(&self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TripStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        TripStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == raw)
            .ok_or_else(|| AppError::Validation(format!("status: unknown value {raw:?}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[validate(schema(function = "validate_trip_dates"))]
pub struct Trip {
    pub id: String,
    pub owner_id: String,
    #[validate(length(min = 3, message = "must be at least 3 characters"))]
    pub destination: String,
    #[validate(length(min = 10, message = "must be at least 10 characters"))]
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[validate(custom(function = "validate_non_negative"))]
    pub budget: f64,
    pub current_spend: f64,
    pub status: TripStatus,
    #[validate(url(message = "must be a valid URL"), custom(function = "validate_http_scheme"))]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }

    pub fn remaining_budget(&self) -> f64 {
        self.budget - self.current_spend
    }
}

fn check_date_range(start: NaiveDate, end: NaiveDate) -> Result<(), ValidationError> {
    if end > start {
        return Ok(());
    }
    let mut error = ValidationError::new("date_range");
    error.message = Some("end_date must be after start_date".into());
    Err(error)
}

fn validate_trip_dates(trip: &Trip) -> Result<(), ValidationError> {
    check_date_range(trip.start_date, trip.end_date)
}

fn validate_new_trip_dates(trip: &NewTrip) -> Result<(), ValidationError> {
    check_date_range(trip.start_date, trip.end_date)
}

/// Row shape of the `trips` table; enums are stored as their wire strings.
#[derive(Debug, FromRow)]
pub(crate) struct TripRow {
    pub id: String,
    pub owner_id: String,
    pub destination: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub budget: f64,
    pub current_spend: f64,
    pub status: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TripRow> for Trip {
    type Error = AppError;

    fn try_from(row: TripRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<TripStatus>().map_err(|_| {
            AppError::Other(anyhow::anyhow!(
                "trip {} has unknown stored status {:?}",
                row.id,
                row.status
            ))
        })?;
        Ok(Trip {
            id: row.id,
            owner_id: row.owner_id,
            destination: row.destination,
            description: row.description,
            start_date: row.start_date,
            end_date: row.end_date,
            budget: row.budget,
            current_spend: row.current_spend,
            status,
            image_url: row.image_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Fields a user supplies when creating a trip. Owner, spend and timestamps
/// are assigned by the repository.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_new_trip_dates"))]
pub struct NewTrip {
    #[validate(length(min = 3, message = "must be at least 3 characters"))]
    pub destination: String,
    #[validate(length(min = 10, message = "must be at least 10 characters"))]
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[validate(custom(function = "validate_non_negative"))]
    pub budget: f64,
    #[serde(default)]
    pub status: TripStatus,
    #[serde(default)]
    #[validate(url(message = "must be a valid URL"), custom(function = "validate_http_scheme"))]
    pub image_url: Option<String>,
}

impl NewTrip {
    /// Validates the input and returns it with text trimmed and a blank
    /// image URL dropped.
    pub fn normalized(self) -> Result<Self, AppError> {
        let trip = Self {
            destination: self.destination.trim().to_string(),
            description: self.description.trim().to_string(),
            image_url: normalize_optional(self.image_url),
            ..self
        };
        trip.validate()?;
        Ok(trip)
    }
}

/// Partial update of a trip. Carries no `current_spend`; only the activity
/// recompute path writes that column.
/// Amounts are checked on the patch itself, before they reach the table's
/// constraints; the rest is checked on the stored record after the write.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct TripPatch {
    pub destination: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[validate(custom(function = "validate_non_negative"))]
    pub budget: Option<f64>,
    pub status: Option<TripStatus>,
    /// `Some("")` clears the image.
    pub image_url: Option<String>,
}

impl TripPatch {
    pub fn status(status: TripStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Trims text fields. An image URL that is blank after trimming stays
    /// `Some("")`, which clears the stored image.
    pub fn normalized(self) -> Self {
        Self {
            destination: self.destination.map(|value| value.trim().to_string()),
            description: self.description.map(|value| value.trim().to_string()),
            image_url: self.image_url.map(|value| value.trim().to_string()),
            ..self
        }
    }

    /// The value to store for `image_url`, when the patch sets it.
    pub fn stored_image_url(&self) -> Option<Option<String>> {
        self.image_url
            .as_ref()
            .map(|value| normalize_optional(Some(value.clone())))
    }
}
