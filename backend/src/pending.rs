//! In-flight request registry used to coalesce duplicate work.
//!
//! A computation is registered under a key together with a shared handle to
//! its outcome. Concurrent callers for the same key attach to that handle
//! instead of starting their own computation. The entry is removed exactly
//! once, the moment the computation resolves and before any waiter sees the
//! outcome. A driver task keeps polling even when every caller has gone away.

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::time::Instant;

type SharedOutcome<T> = Shared<BoxFuture<'static, T>>;

struct PendingEntry<T> {
    id: u64,
    outcome: SharedOutcome<T>,
    started_at: Instant,
}

pub struct PendingRegistry<T> {
    name: &'static str,
    entries: Arc<Mutex<HashMap<String, PendingEntry<T>>>>,
    ttl: Duration,
    next_id: AtomicU64,
}

/// A caller's view of a registered computation.
pub struct PendingHandle<T> {
    outcome: SharedOutcome<T>,
    started: bool,
}

impl<T: Clone> PendingHandle<T> {
    /// True when this caller's factory started the computation.
    pub fn started(&self) -> bool {
        self.started
    }

    pub async fn wait(self) -> T {
        self.outcome.await
    }
}

impl<T> PendingRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Attach to the live computation for `key`, or start one with `factory`.
    ///
    /// `factory` runs under the registry lock and must only build the future;
    /// the work itself happens when the returned future is polled.
    pub fn get_or_create<F, Fut>(&self, key: &str, factory: F) -> PendingHandle<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let swept = sweep(&mut entries, now, self.ttl);
        if swept > 0 {
            tracing::warn!(
                "{} registry dropped {} abandoned pending entries",
                self.name,
                swept
            );
        }

        if let Some(entry) = entries.get(key) {
            tracing::debug!("{} registry: joining in-flight computation for {key}", self.name);
            return PendingHandle {
                outcome: entry.outcome.clone(),
                started: false,
            };
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let computation = factory();
        let registry = Arc::clone(&self.entries);
        let owned_key = key.to_string();
        let outcome = async move {
            let value = computation.await;
            let mut entries = registry.lock();
            // A sweep or clear may have replaced the entry in the meantime.
            if entries.get(&owned_key).is_some_and(|entry| entry.id == id) {
                entries.remove(&owned_key);
            }
            drop(entries);
            value
        }
        .boxed()
        .shared();
        entries.insert(
            key.to_string(),
            PendingEntry {
                id,
                outcome: outcome.clone(),
                started_at: now,
            },
        );
        drop(entries);

        let driver = outcome.clone();
        tokio::spawn(async move {
            driver.await;
        });

        PendingHandle {
            outcome,
            started: true,
        }
    }

    /// Drops entries older than the pending TTL.
    pub fn sweep_expired(&self) -> usize {
        sweep(&mut self.entries.lock(), Instant::now(), self.ttl)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every entry. Running computations are not cancelled.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let cleared = entries.len();
        entries.clear();
        cleared
    }
}

fn sweep<T>(entries: &mut HashMap<String, PendingEntry<T>>, now: Instant, ttl: Duration) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| now.saturating_duration_since(entry.started_at) < ttl);
    before - entries.len()
}
