//! In-flight fetch de-duplication.
//!
//! Concurrent misses for the same key share one upstream fetch: the first
//! caller runs it, later callers await the same cell.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

use crate::cache::CacheKey;

type Flight<T> = Arc<OnceCell<T>>;

/// Map from cache key to the pending result of its fetch.
pub struct InFlight<T> {
    flights: Mutex<HashMap<CacheKey, Flight<T>>>,
}

impl<T: Clone> InFlight<T> {
    pub fn new() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `fetch` unless a fetch for `key` is already pending, in which case
    /// its result is awaited instead.
    ///
    /// If the running caller is cancelled, a waiting caller takes over.
    pub async fn run<F, Fut>(&self, key: &CacheKey, fetch: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let flight = {
            let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(flights.entry(key.clone()).or_default())
        };
        let departure = Departure {
            flights: &self.flights,
            key,
            flight,
        };

        let result = departure.flight.get_or_init(fetch).await.clone();
        result
    }

    /// Number of keys with a pending fetch.
    pub fn len(&self) -> usize {
        self.flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes a caller's map entry when it leaves, whether it finished or was
/// dropped mid-fetch.
struct Departure<'a, T> {
    flights: &'a Mutex<HashMap<CacheKey, Flight<T>>>,
    key: &'a CacheKey,
    flight: Flight<T>,
}

impl<T> Drop for Departure<'_, T> {
    fn drop(&mut self) {
        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        let ours = flights
            .get(self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &self.flight));
        // One reference in the map plus ours: nobody else is waiting
        let abandoned = Arc::strong_count(&self.flight) <= 2;
        if ours && (self.flight.initialized() || abandoned) {
            flights.remove(self.key);
        }
    }
}

impl<T: Clone> Default for InFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}
