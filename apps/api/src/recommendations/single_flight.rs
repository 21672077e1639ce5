//! Coalesces concurrent generations for the same cache key.
//!
//! The first caller for a key becomes the leader and owns the generation;
//! later callers get a [`Waiter`] on the same watch channel. The entry is
//! removed from the map before the result is published, so a caller arriving
//! afterwards starts from the cache rather than attaching to a finished flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

struct Flight<T> {
    id: u64,
    rx: watch::Receiver<Option<T>>,
}

pub struct SingleFlight<T> {
    next_id: AtomicU64,
    flights: Mutex<HashMap<String, Flight<T>>>,
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Attaches to the in-flight generation for `key`, or registers a new one.
    /// The leader, if returned, must publish through [`Leader::complete`].
    pub fn join(self: &Arc<Self>, key: &str) -> (Option<Leader<T>>, Waiter<T>) {
        let mut flights = self.lock();
        if let Some(flight) = flights.get(key) {
            return (None, Waiter { rx: flight.rx.clone() });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        flights.insert(key.to_string(), Flight { id, rx: rx.clone() });

        let leader = Leader {
            group: Arc::clone(self),
            key: key.to_string(),
            id,
            tx,
        };
        (Some(leader), Waiter { rx })
    }

    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    fn release(&self, key: &str, id: u64) {
        let mut flights = self.lock();
        if flights.get(key).is_some_and(|f| f.id == id) {
            flights.remove(key);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Flight<T>>> {
        self.flights.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Owner of one generation. Dropping it without completing releases the key
/// and wakes waiters with no value.
pub struct Leader<T: Clone> {
    group: Arc<SingleFlight<T>>,
    key: String,
    id: u64,
    tx: watch::Sender<Option<T>>,
}

impl<T: Clone> Leader<T> {
    pub fn complete(self, value: T) {
        self.group.release(&self.key, self.id);
        self.tx.send_replace(Some(value));
    }
}

impl<T: Clone> Drop for Leader<T> {
    fn drop(&mut self) {
        self.group.release(&self.key, self.id);
    }
}

pub struct Waiter<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> Waiter<T> {
    /// Resolves with the leader's value, or `None` if the leader went away.
    pub async fn wait(mut self) -> Option<T> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        }
    }
}
