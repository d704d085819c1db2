use chrono::NaiveDate;
use serde::Serialize;

use crate::models::trip::{Trip, TripStatus};

const UPCOMING_LIMIT: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_trips: usize,
    pub planned: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub total_budget: f64,
    pub total_spend: f64,
    /// Share of the summed budget already spent, in percent. Zero when there
    /// is no budget at all.
    pub percent_spent: f64,
}

impl DashboardStats {
    pub fn from_trips(trips: &[Trip]) -> Self {
        let count = |status: TripStatus| trips.iter().filter(|t| t.status == status).count();
        let total_budget = trips.iter().fold(0.0, |sum, trip| sum + trip.budget);
        let total_spend = trips.iter().fold(0.0, |sum, trip| sum + trip.current_spend);
        let percent_spent = if total_budget > 0.0 {
            total_spend / total_budget * 100.0
        } else {
            0.0
        };
        Self {
            total_trips: trips.len(),
            planned: count(TripStatus::Planned),
            in_progress: count(TripStatus::InProgress),
            completed: count(TripStatus::Completed),
            total_budget,
            total_spend,
            percent_spent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub stats: DashboardStats,
    pub upcoming: Vec<Trip>,
}

impl Dashboard {
    pub fn build(trips: &[Trip], today: NaiveDate) -> Self {
        Self {
            stats: DashboardStats::from_trips(trips),
            upcoming: upcoming_trips(trips, today),
        }
    }
}

/// Open trips starting today or later, soonest first.
pub fn upcoming_trips(trips: &[Trip], today: NaiveDate) -> Vec<Trip> {
    let mut upcoming: Vec<Trip> = trips
        .iter()
        .filter(|trip| !trip.status.is_closed() && trip.start_date >= today)
        .cloned()
        .collect();
    upcoming.sort_by_key(|trip| trip.start_date);
    upcoming.truncate(UPCOMING_LIMIT);
    upcoming
}
