use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-trip async locks serialising every write that recomputes a trip's
/// current spend.
#[derive(Clone, Default)]
pub struct TripLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

pub type TripGuard = OwnedMutexGuard<()>;

impl TripLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, trip_id: &str) -> TripGuard {
        self.slot(trip_id).lock_owned().await
    }

    /// Locks several trips in identifier order, so two writers touching the
    /// same pair of trips cannot deadlock.
    pub async fn lock_all(&self, trip_ids: &[&str]) -> Vec<TripGuard> {
        let mut ordered = trip_ids.to_vec();
        ordered.sort_unstable();
        ordered.dedup();
        let mut guards = Vec::with_capacity(ordered.len());
        for trip_id in ordered {
            guards.push(self.lock(trip_id).await);
        }
        guards
    }

    fn slot(&self, trip_id: &str) -> Arc<AsyncMutex<()>> {
        let mut slots = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Drop slots nobody holds or waits on.
        slots.retain(|id, slot| id == trip_id || Arc::strong_count(slot) > 1);
        slots.entry(trip_id.to_string()).or_default().clone()
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
