//! Cache Table Module
//!
//! Main cache engine: a keyed map of items with sliding-TTL expiration,
//! observer hooks, a pluggable miss-loader, and a rearm-on-demand sweep
//! timer that always wakes at the next-soonest deadline.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{RwLock, RwLockWriteGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, Dispatch};

use crate::cache::CacheItem;
use crate::error::{CacheError, Result};
use crate::tasks::spawn_sweep_timer;

/// Table-wide observer invoked with an item's key and value.
pub type ItemObserver<K, V> = Arc<dyn Fn(&K, &V) + Send + Sync>;

/// Miss-loader: synthesizes a fresh item for an absent key.
pub type LoadItemFn<K, V> = Arc<dyn Fn(&K) -> CacheItem<K, V> + Send + Sync>;

// == Cache Table ==
/// A named collection of cached items with time-based eviction.
///
/// The table is a cheap handle; cloning it yields another handle to the same
/// underlying state, which is how the sweep timer and host threads share one
/// table. An armed timer holds such a handle, so the table state stays alive
/// until the timer is disarmed or the process exits.
///
/// Eviction is purely time-based: every item carries an idle-time budget
/// (its life span), each successful [`data`](CacheTable::data) call renews
/// the budget, and a background sweep evicts items whose budget has elapsed.
/// The sweep is not periodic; it is rearmed after every pass to fire exactly
/// when the next item could expire.
///
/// Arming the sweep spawns a tokio task, so a table holding items with a
/// non-zero life span must be used from within a tokio runtime.
pub struct CacheTable<K, V> {
    inner: Arc<TableInner<K, V>>,
}

impl<K, V> Clone for CacheTable<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Shared table state behind the handle.
pub(crate) struct TableInner<K, V> {
    /// Identity label carried on diagnostic events.
    name: String,
    /// Everything the table-wide lock guards: the map, the timer handle,
    /// and the observer/loader configuration.
    state: RwLock<TableState<K, V>>,
    /// Optional per-table diagnostic sink.
    logger: RwLock<Option<Dispatch>>,
}

struct TableState<K, V> {
    items: HashMap<K, Arc<CacheItem<K, V>>>,
    /// At most one armed timer at a time.
    cleaner: Option<JoinHandle<()>>,
    /// Delay of the most recently armed timer; `ZERO` when nothing is armed.
    cleanup_interval: Duration,
    after_add: Vec<ItemObserver<K, V>>,
    before_delete: Vec<ItemObserver<K, V>>,
    loader: Option<LoadItemFn<K, V>>,
}

impl<K, V> CacheTable<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a new, empty cache table with the given identity label.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TableInner {
                name: name.into(),
                state: RwLock::new(TableState {
                    items: HashMap::new(),
                    cleaner: None,
                    cleanup_interval: Duration::ZERO,
                    after_add: Vec::new(),
                    before_delete: Vec::new(),
                    loader: None,
                }),
                logger: RwLock::new(None),
            }),
        }
    }

    /// Returns the table's identity label.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the current number of items in the table.
    pub fn len(&self) -> usize {
        self.inner.state.read().items.len()
    }

    /// Returns true if the table holds no items.
    pub fn is_empty(&self) -> bool {
        self.inner.state.read().items.is_empty()
    }

    /// Returns true if `key` is currently present, without renewing it.
    pub fn exists(&self, key: &K) -> bool {
        self.inner.state.read().items.contains_key(key)
    }

    // == Add ==
    /// Stores `value` under `key` with the given idle-time budget, replacing
    /// any prior item for that key.
    ///
    /// Post-add observers run after the map is updated and outside the table
    /// lock, so they may call back into the table. If the new item's life
    /// span is shorter than the currently armed sweep delay (or nothing is
    /// armed), a sweep runs synchronously to tighten the timer.
    ///
    /// A `life_span` of [`Duration::ZERO`] pins the item: it never expires
    /// and is skipped by the sweep.
    pub fn add(&self, key: K, value: V, life_span: Duration) {
        let item = Arc::new(CacheItem::new(key, value, life_span));
        let (after_add, armed_interval, armed) = {
            let mut state = self.inner.state.write();
            state.items.insert(item.key().clone(), Arc::clone(&item));
            (
                state.after_add.clone(),
                state.cleanup_interval,
                state.cleaner.is_some(),
            )
        };

        for callback in &after_add {
            callback(item.key(), item.value());
        }

        if !life_span.is_zero() && (!armed || life_span < armed_interval) {
            Arc::clone(&self.inner).check_expire();
        }
    }

    // == Data ==
    /// Looks up `key`, renewing the item's idle budget on a hit.
    ///
    /// On a miss with a loader configured, the loader runs outside the table
    /// lock (it may call back into the table), its item is added to the map,
    /// and the loader's own item is returned. That returned item is a
    /// distinct object from the stored copy, so callers must not assume
    /// reference identity with what a later lookup returns.
    ///
    /// On a miss with no loader, fails with [`CacheError::NotFound`].
    pub fn data(&self, key: &K) -> Result<Arc<CacheItem<K, V>>> {
        let (found, loader) = {
            let state = self.inner.state.read();
            (state.items.get(key).cloned(), state.loader.clone())
        };

        if let Some(item) = found {
            item.touch();
            return Ok(item);
        }

        if let Some(loader) = loader {
            let loaded = loader(key);
            self.add(
                loaded.key().clone(),
                loaded.value().clone(),
                loaded.life_span(),
            );
            return Ok(Arc::new(loaded));
        }

        Err(CacheError::NotFound)
    }

    // == Remove ==
    /// Removes `key` from the table, running pre-delete observers and the
    /// item's own expire callbacks outside the lock.
    ///
    /// A no-op if the key is absent; observers are not invoked in that case.
    pub fn remove(&self, key: &K) {
        let state = self.inner.state.write();
        drop(self.inner.delete_internal(state, key));
    }

    // == Flush ==
    /// Drops every item and disarms the sweep timer.
    ///
    /// Observers are not consulted; this resets the table wholesale.
    pub fn flush(&self) {
        let mut state = self.inner.state.write();
        if let Some(cleaner) = state.cleaner.take() {
            cleaner.abort();
        }
        let dropped = state.items.len();
        state.items.clear();
        state.cleanup_interval = Duration::ZERO;
        self.inner
            .emit(|| info!(table = %self.inner.name, dropped, "flushed all items"));
    }

    // == Foreach ==
    /// Visits every item under the table's read lock.
    ///
    /// The closure must not call table mutators; use a collected snapshot for
    /// that instead.
    pub fn foreach(&self, mut f: impl FnMut(&K, &Arc<CacheItem<K, V>>)) {
        let state = self.inner.state.read();
        for (key, item) in &state.items {
            f(key, item);
        }
    }

    // == Observer And Loader Registration ==
    /// Routes this table's diagnostic events to `sink` instead of the global
    /// subscriber.
    pub fn set_logger(&self, sink: Dispatch) {
        *self.inner.logger.write() = Some(sink);
    }

    /// Registers an observer invoked after every insert.
    pub fn on_after_add(&self, f: impl Fn(&K, &V) + Send + Sync + 'static) {
        self.inner.state.write().after_add.push(Arc::new(f));
    }

    /// Drops all post-add observers.
    pub fn clear_after_add(&self) {
        self.inner.state.write().after_add.clear();
    }

    /// Registers an observer invoked before every delete or eviction.
    pub fn on_before_delete(&self, f: impl Fn(&K, &V) + Send + Sync + 'static) {
        self.inner.state.write().before_delete.push(Arc::new(f));
    }

    /// Drops all pre-delete observers.
    pub fn clear_before_delete(&self) {
        self.inner.state.write().before_delete.clear();
    }

    /// Installs the miss-loader used by [`data`](CacheTable::data).
    pub fn set_loader(&self, f: impl Fn(&K) -> CacheItem<K, V> + Send + Sync + 'static) {
        self.inner.state.write().loader = Some(Arc::new(f));
    }

    /// Removes the miss-loader; subsequent misses fail with
    /// [`CacheError::NotFound`].
    pub fn clear_loader(&self) {
        self.inner.state.write().loader = None;
    }
}

impl<K, V> TableInner<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Emits a diagnostic event through the per-table sink when one is set,
    /// otherwise through the global subscriber.
    pub(crate) fn emit<F: FnOnce()>(&self, event: F) {
        match self.logger.read().as_ref() {
            Some(sink) => tracing::dispatcher::with_default(sink, event),
            None => event(),
        }
    }

    /// Internal delete path. Caller holds the write lock on entry; the lock
    /// is released while observers run and re-acquired before the map slot is
    /// removed, so the returned guard is held again on exit.
    ///
    /// Observers may re-enter the table during the unlocked window; they see
    /// the map as it is at that moment, not a snapshot.
    fn delete_internal<'a>(
        &'a self,
        state: RwLockWriteGuard<'a, TableState<K, V>>,
        key: &K,
    ) -> RwLockWriteGuard<'a, TableState<K, V>> {
        let before_delete = state.before_delete.clone();
        let item = state.items.get(key).cloned();
        drop(state);

        if let Some(item) = &item {
            for callback in &before_delete {
                callback(item.key(), item.value());
            }
            for callback in item.expire_callbacks() {
                callback(item.key(), item.value());
            }
        }

        let mut state = self.state.write();
        state.items.remove(key);
        state
    }

    /// Active expiration sweep.
    ///
    /// Stops the armed timer, evicts every item whose idle budget has
    /// elapsed, then rearms the timer for exactly the smallest remaining
    /// time-to-expiry. Items with a zero life span never expire and are
    /// skipped. The timer is never left idle while expirable items remain.
    pub(crate) fn check_expire(self: Arc<Self>) {
        let mut state = self.state.write();
        if let Some(cleaner) = state.cleaner.take() {
            cleaner.abort();
        }

        let now = Instant::now();
        let mut expired = Vec::new();
        let mut next_due: Option<Duration> = None;
        for (key, item) in &state.items {
            let life_span = item.life_span();
            if life_span.is_zero() {
                continue;
            }
            let idle = now.duration_since(item.accessed_on());
            if idle >= life_span {
                expired.push(key.clone());
            } else {
                let remaining = life_span - idle;
                if next_due.map_or(true, |due| remaining < due) {
                    next_due = Some(remaining);
                }
            }
        }

        let evicted = expired.len();
        for key in &expired {
            state = self.delete_internal(state, key);
        }
        if evicted > 0 {
            self.emit(|| info!(table = %self.name, evicted, "sweep evicted idle items"));
        } else {
            self.emit(|| debug!(table = %self.name, "sweep found no idle items"));
        }

        match next_due {
            Some(due) => {
                // A re-entrant observer may have armed a tighter timer while
                // the lock was released; only replace it when this sweep's
                // deadline is sooner.
                if state.cleaner.is_none()
                    || state.cleanup_interval.is_zero()
                    || due < state.cleanup_interval
                {
                    if let Some(stale) = state.cleaner.take() {
                        stale.abort();
                    }
                    state.cleanup_interval = due;
                    state.cleaner = Some(spawn_sweep_timer(Arc::clone(&self), due));
                    self.emit(|| {
                        debug!(
                            table = %self.name,
                            due_ms = due.as_millis() as u64,
                            "rearmed expiration timer"
                        );
                    });
                }
            }
            None => {
                if state.cleaner.is_none() {
                    state.cleanup_interval = Duration::ZERO;
                }
            }
        }
    }
}
