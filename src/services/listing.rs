use std::cmp::Ordering;

use serde::Deserialize;

use crate::models::trip::{Trip, TripStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum StatusFilter {
    #[default]
    All,
    Only(TripStatus),
}

impl StatusFilter {
    pub fn matches(&self, status: TripStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => *wanted == status,
        }
    }
}

impl TryFrom<String> for StatusFilter {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        match raw.trim() {
            "" | "all" => Ok(StatusFilter::All),
            other => other
                .parse::<TripStatus>()
                .map(StatusFilter::Only)
                .map_err(|err| err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TripSort {
    #[default]
    DateDesc,
    DateAsc,
    DestinationAsc,
    DestinationDesc,
    BudgetDesc,
    BudgetAsc,
}

impl TripSort {
    fn compare(&self, a: &Trip, b: &Trip) -> Ordering {
        match self {
            TripSort::DateDesc => b.start_date.cmp(&a.start_date),
            TripSort::DateAsc => a.start_date.cmp(&b.start_date),
            TripSort::DestinationAsc => compare_destination(a, b),
            TripSort::DestinationDesc => compare_destination(b, a),
            TripSort::BudgetDesc => b.budget.total_cmp(&a.budget),
            TripSort::BudgetAsc => a.budget.total_cmp(&b.budget),
        }
    }
}

fn compare_destination(a: &Trip, b: &Trip) -> Ordering {
    a.destination
        .to_lowercase()
        .cmp(&b.destination.to_lowercase())
        .then_with(|| a.destination.cmp(&b.destination))
}

/// Search, status filter and sort order of the trip list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TripListQuery {
    pub search: String,
    pub status: StatusFilter,
    pub sort: TripSort,
}

impl TripListQuery {
    /// Recomputes the visible list from the full owner-scoped sequence. The
    /// sort is stable, so ties keep the input order.
    pub fn apply(&self, trips: &[Trip]) -> Vec<Trip> {
        let needle = self.search.trim().to_lowercase();
        let mut visible: Vec<Trip> = trips
            .iter()
            .filter(|trip| {
                needle.is_empty()
                    || trip.destination.to_lowercase().contains(&needle)
                    || trip.description.to_lowercase().contains(&needle)
            })
            .filter(|trip| self.status.matches(trip.status))
            .cloned()
            .collect();
        visible.sort_by(|a, b| self.sort.compare(a, b));
        visible
    }
}
