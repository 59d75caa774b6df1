//! Write-through cache over a [`StorageAdapter`]

use crate::errors::{DataError, Result};
use crate::storage::StorageAdapter;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-key outcome of [`DataPersistenceManager::bulk_save`]
#[derive(Debug, Default)]
pub struct BulkSaveReport {
    pub saved: Vec<String>,
    pub failed: Vec<(String, DataError)>,
}

impl BulkSaveReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Persistence front end.
///
/// `save` writes through to the adapter before touching the cache, `load`
/// reads the cache first. Every write to a key takes a ticket when it is
/// *called*; writes to the same key run one at a time and a write whose
/// ticket has been superseded is skipped, so the last submitted write wins.
///
/// Cache misses are read under the same per-key lock as writes and are only
/// cached when no write or clear was ticketed after the read began. `clear`
/// supersedes every ticket issued before it and waits for operations already
/// past their ticket check.
pub struct DataPersistenceManager {
    storage: Arc<dyn StorageAdapter>,
    cache: Mutex<HashMap<String, Value>>,
    latest: Mutex<HashMap<String, u64>>,
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    next_ticket: AtomicU64,
    /// Tickets below this were issued before the last `clear`
    cleared_at: AtomicU64,
    /// Shared by per-key operations, exclusive for `clear`
    gate: tokio::sync::RwLock<()>,
}

impl DataPersistenceManager {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            storage,
            cache: Mutex::new(HashMap::new()),
            latest: Mutex::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(1),
            cleared_at: AtomicU64::new(0),
            gate: tokio::sync::RwLock::new(()),
        }
    }

    /// Persist `data` under `key`. The ticket is taken before the returned
    /// future is first polled.
    pub fn save(
        &self,
        key: impl Into<String>,
        data: Value,
    ) -> impl Future<Output = Result<()>> + Send + '_ {
        let key = key.into();
        let (ticket, lock) = self.reserve(&key);
        async move {
            let outcome = {
                let _guard = lock.lock().await;
                let _gate = self.gate.read().await;
                self.write(&key, data, ticket).await
            };
            drop(lock);
            self.release(&key);
            outcome
        }
    }

    pub async fn load(&self, key: &str) -> Result<Option<Value>> {
        if let Some(hit) = self.cache.lock().get(key).cloned() {
            debug!(key = %key, "Cache hit");
            return Ok(Some(hit));
        }

        let since = self.next_ticket.load(Ordering::SeqCst);
        let lock = self.key_lock(key);
        let outcome = {
            let _guard = lock.lock().await;
            let _gate = self.gate.read().await;
            self.read_through(key, since).await
        };
        drop(lock);
        self.release(key);
        outcome
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        // Supersede any save still waiting for this key
        let (_, lock) = self.reserve(key);
        let outcome = {
            let _guard = lock.lock().await;
            let _gate = self.gate.read().await;
            self.remove(key).await
        };
        drop(lock);
        self.release(key);
        outcome
    }

    pub async fn clear(&self) -> Result<()> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        self.cleared_at.fetch_max(ticket, Ordering::SeqCst);

        let outcome = self.wipe().await;
        self.prune_idle();
        outcome
    }

    /// Save every item concurrently. The unit of atomicity is the key: a
    /// failing key is reported and does not stop the others.
    pub async fn bulk_save<I, K>(&self, items: I) -> BulkSaveReport
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let (keys, writes): (Vec<String>, Vec<_>) = items
            .into_iter()
            .map(|(key, data)| {
                let key = key.into();
                let write = self.save(key.clone(), data);
                (key, write)
            })
            .unzip();

        let mut report = BulkSaveReport::default();
        for (key, outcome) in keys.into_iter().zip(join_all(writes).await) {
            match outcome {
                Ok(()) => report.saved.push(key),
                Err(err) => {
                    warn!(key = %key, error = %err, "Bulk save entry failed");
                    report.failed.push((key, err));
                }
            }
        }

        debug!(
            saved = report.saved.len(),
            failed = report.failed.len(),
            "Bulk save finished"
        );
        report
    }

    pub fn cached_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.cache.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Drop a cached entry so the next `load` goes to storage
    pub fn invalidate(&self, key: &str) -> bool {
        self.cache.lock().remove(key).is_some()
    }

    /// Ticket plus lock handle for a write. Both are taken under the
    /// `key_locks` mutex so `release` never prunes a key with a live ticket.
    fn reserve(&self, key: &str) -> (u64, Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.key_locks.lock();
        let lock = locks.entry(key.to_string()).or_default().clone();
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        self.latest.lock().insert(key.to_string(), ticket);
        (ticket, lock)
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.key_locks
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// Forget a key's lock and ticket once no operation holds them
    fn release(&self, key: &str) {
        let mut locks = self.key_locks.lock();
        if locks
            .get(key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(key);
            self.latest.lock().remove(key);
        }
    }

    fn prune_idle(&self) {
        let mut locks = self.key_locks.lock();
        let mut latest = self.latest.lock();
        locks.retain(|key, lock| {
            let busy = Arc::strong_count(lock) > 1;
            if !busy {
                latest.remove(key);
            }
            busy
        });
    }

    fn is_superseded(&self, key: &str, ticket: u64) -> bool {
        ticket < self.cleared_at.load(Ordering::SeqCst)
            || self
                .latest
                .lock()
                .get(key)
                .is_some_and(|latest| *latest > ticket)
    }

    /// Whether a write, delete or clear was ticketed at or after `since`
    fn changed_since(&self, key: &str, since: u64) -> bool {
        self.cleared_at.load(Ordering::SeqCst) >= since
            || self
                .latest
                .lock()
                .get(key)
                .is_some_and(|latest| *latest >= since)
    }

    async fn write(&self, key: &str, data: Value, ticket: u64) -> Result<()> {
        if self.is_superseded(key, ticket) {
            debug!(key = %key, ticket, "Skipping superseded write");
            return Ok(());
        }

        self.storage.save(key, &data).await?;
        self.cache.lock().insert(key.to_string(), data);
        Ok(())
    }

    async fn read_through(&self, key: &str, since: u64) -> Result<Option<Value>> {
        // A write may have landed while this load waited for the lock
        if let Some(hit) = self.cache.lock().get(key).cloned() {
            return Ok(Some(hit));
        }

        let loaded = self.storage.load(key).await?;
        if let Some(value) = &loaded {
            if self.changed_since(key, since) {
                debug!(key = %key, "Not caching a read overtaken by a newer write");
            } else {
                self.cache.lock().insert(key.to_string(), value.clone());
            }
        }
        Ok(loaded)
    }

    async fn wipe(&self) -> Result<()> {
        let _gate = self.gate.write().await;
        self.storage.clear().await?;
        self.cache.lock().clear();
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.storage.delete(key).await?;
        self.cache.lock().remove(key);
        Ok(())
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.key_locks.lock().len().max(self.latest.lock().len())
    }
}
