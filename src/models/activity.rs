use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::{
    error::AppError,
    models::time_of_day,
    validation::{validate_non_negative, validate_stored_time},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActivityCategory {
    Transport,
    Lodging,
    Food,
    Entertainment,
    #[default]
    Other,
}

impl ActivityCategory {
    /// Fixed display order, also used by the per-category breakdown.
    pub const ALL: [ActivityCategory; 5] = [
        ActivityCategory::Transport,
        ActivityCategory::Lodging,
        ActivityCategory::Food,
        ActivityCategory::Entertainment,
        ActivityCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityCategory::Transport => "transport",
            ActivityCategory::Lodging => "lodging",
            ActivityCategory::Food => "food",
            ActivityCategory::Entertainment => "entertainment",
            ActivityCategory::Other => "other",
        }
    }
}

impl fmt::Display for ActivityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActivityCategory {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        ActivityCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == raw)
            .ok_or_else(|| AppError::Validation(format!("category: unknown value {raw:?}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct Activity {
    pub id: String,
    pub trip_id: String,
    pub owner_id: String,
    #[validate(length(min = 3, message = "must be at least 3 characters"))]
    pub name: String,
    #[validate(length(min = 5, message = "must be at least 5 characters"))]
    pub description: String,
    pub date: NaiveDate,
    /// 24-hour `HH:MM`.
    #[validate(custom(function = "validate_stored_time"))]
    pub time: String,
    #[validate(custom(function = "validate_non_negative"))]
    pub cost: f64,
    pub category: ActivityCategory,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    pub fn time_12h(&self) -> Option<String> {
        time_of_day::to_twelve_hour(&self.time)
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ActivityRow {
    pub id: String,
    pub trip_id: String,
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: String,
    pub cost: f64,
    pub category: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ActivityRow> for Activity {
    type Error = AppError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        let category = row.category.parse::<ActivityCategory>().map_err(|_| {
            AppError::Other(anyhow::anyhow!(
                "activity {} has unknown stored category {:?}",
                row.id,
                row.category
            ))
        })?;
        Ok(Activity {
            id: row.id,
            trip_id: row.trip_id,
            owner_id: row.owner_id,
            name: row.name,
            description: row.description,
            date: row.date,
            time: row.time,
            cost: row.cost,
            category,
            completed: row.completed,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewActivity {
    pub trip_id: String,
    #[validate(length(min = 3, message = "must be at least 3 characters"))]
    pub name: String,
    #[validate(length(min = 5, message = "must be at least 5 characters"))]
    pub description: String,
    pub date: NaiveDate,
    #[validate(custom(function = "validate_stored_time"))]
    pub time: String,
    #[validate(custom(function = "validate_non_negative"))]
    pub cost: f64,
    #[serde(default)]
    pub category: ActivityCategory,
}

impl NewActivity {
    /// Validates the input and returns it with text trimmed and the time in
    /// stored `HH:MM` form.
    pub fn normalized(self) -> Result<Self, AppError> {
        let activity = Self {
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
            time: time_of_day::normalize(&self.time).unwrap_or(self.time),
            ..self
        };
        activity.validate()?;
        Ok(activity)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ActivityPatch {
    pub trip_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    #[validate(custom(function = "validate_non_negative"))]
    pub cost: Option<f64>,
    pub category: Option<ActivityCategory>,
}

impl ActivityPatch {
    /// Whether applying this patch can change a trip's aggregate spend.
    pub fn touches_spend(&self) -> bool {
        self.cost.is_some() || self.trip_id.is_some()
    }

    /// Trims text fields and brings a 12-hour time into stored form.
    /// Unparseable times are kept as given and fail validation later.
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.map(|value| value.trim().to_string()),
            description: self.description.map(|value| value.trim().to_string()),
            time: self
                .time
                .map(|value| time_of_day::normalize(&value).unwrap_or(value)),
            ..self
        }
    }
}
