use serde::Serialize;

use crate::models::activity::{Activity, ActivityCategory};

/// Current spend of a trip: the plain sum of its activities' costs.
pub fn total_cost(activities: &[Activity]) -> f64 {
    activities.iter().fold(0.0, |total, activity| total + activity.cost)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: ActivityCategory,
    pub total: f64,
}

/// Spend per category in the fixed category order, leaving out categories
/// with nothing spent.
pub fn category_breakdown(activities: &[Activity]) -> Vec<CategoryTotal> {
    ActivityCategory::ALL
        .into_iter()
        .map(|category| CategoryTotal {
            category,
            total: total_cost_where(activities, |activity| activity.category == category),
        })
        .filter(|entry| entry.total > 0.0)
        .collect()
}

fn total_cost_where(activities: &[Activity], keep: impl Fn(&Activity) -> bool) -> f64 {
    activities
        .iter()
        .filter(|activity| keep(activity))
        .fold(0.0, |total, activity| total + activity.cost)
}
