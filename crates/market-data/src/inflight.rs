//! In-flight request coalescing.
//!
//! Concurrent calls with the same fingerprint share one upstream execution.
//! The execution runs on its own task, so it finishes (and populates the
//! cache) even if every caller stops waiting. The task removes its own map
//! entry when done; later calls start a fresh execution.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, warn};

use crate::errors::MarketDataError;

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, MarketDataError>>>;

struct Pending<T> {
    id: u64,
    future: SharedFetch<T>,
}

type PendingMap<T> = Mutex<HashMap<String, Pending<T>>>;

fn lock_pending<T>(pending: &PendingMap<T>) -> MutexGuard<'_, HashMap<String, Pending<T>>> {
    pending.lock().unwrap_or_else(|poisoned| {
        warn!("In-flight map mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Map of executions currently running, keyed by fingerprint.
pub struct InFlight<T> {
    pending: Arc<PendingMap<T>>,
    next_id: AtomicU64,
}

impl<T> Default for InFlight<T> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T> InFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the execution running for `key`, or start one with `start`.
    ///
    /// `start` is only called when no execution is running. Every caller
    /// observes the same result.
    pub async fn run<F, Fut>(&self, key: &str, start: F) -> Result<T, MarketDataError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, MarketDataError>> + Send + 'static,
    {
        let shared = {
            let mut pending = lock_pending(&self.pending);
            match pending.get(key) {
                Some(existing) => {
                    debug!("Joining in-flight fetch '{}'", key);
                    existing.future.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let future = self.spawn(key.to_string(), id, start());
                    pending.insert(
                        key.to_string(),
                        Pending {
                            id,
                            future: future.clone(),
                        },
                    );
                    future
                }
            }
        };

        shared.await
    }

    fn spawn<Fut>(&self, key: String, id: u64, fetch: Fut) -> SharedFetch<T>
    where
        Fut: Future<Output = Result<T, MarketDataError>> + Send + 'static,
    {
        let map = Arc::clone(&self.pending);
        let handle = tokio::spawn(async move {
            let result = fetch.await;
            {
                let mut pending = lock_pending(&map);
                if pending.get(&key).map(|p| p.id) == Some(id) {
                    pending.remove(&key);
                }
            }
            result
        });

        async move {
            handle.await.unwrap_or_else(|err| {
                warn!("In-flight fetch task failed: {}", err);
                Err(MarketDataError::Internal(format!("fetch task failed: {}", err)))
            })
        }
        .boxed()
        .shared()
    }

    /// Number of executions currently running.
    pub fn len(&self) -> usize {
        lock_pending(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
