//! Cache Item Module
//!
//! Defines a single cached record with sliding-TTL bookkeeping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Observer attached to a single item, invoked with the item's key and value
/// when the item is evicted or removed.
pub type ExpireCallback<K, V> = Arc<dyn Fn(&K, &V) + Send + Sync>;

// == Cache Item ==
/// A single cached key/value pair plus its expiration bookkeeping.
///
/// The key, value, life span, and creation time are fixed at construction.
/// The access timestamp, access counter, and expire callback list live behind
/// the item's own lock so the table's sweep can read them while concurrent
/// lookups renew the item.
///
/// A life span of [`Duration::ZERO`] means the item never expires.
pub struct CacheItem<K, V> {
    key: K,
    value: V,
    life_span: Duration,
    created_on: Instant,
    state: RwLock<ItemState<K, V>>,
}

/// Mutable portion of an item, guarded by the item's lock.
struct ItemState<K, V> {
    accessed_on: Instant,
    accessed_count: u64,
    expire_callbacks: Vec<ExpireCallback<K, V>>,
}

impl<K, V> CacheItem<K, V> {
    // == Constructor ==
    /// Creates a new item holding `value` under `key`.
    ///
    /// The item starts with its access timestamp equal to its creation
    /// timestamp and an access count of zero.
    pub fn new(key: K, value: V, life_span: Duration) -> Self {
        let now = Instant::now();
        Self {
            key,
            value,
            life_span,
            created_on: now,
            state: RwLock::new(ItemState {
                accessed_on: now,
                accessed_count: 0,
                expire_callbacks: Vec::new(),
            }),
        }
    }

    // == Accessors ==
    /// Returns the item's key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Returns the item's value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Returns the idle-time budget after which the item is considered stale.
    pub fn life_span(&self) -> Duration {
        self.life_span
    }

    /// Returns when the item was created.
    pub fn created_on(&self) -> Instant {
        self.created_on
    }

    /// Returns when the item was last accessed (or created, if never read).
    pub fn accessed_on(&self) -> Instant {
        self.state.read().accessed_on
    }

    /// Returns how many times the item has been read through the table.
    pub fn access_count(&self) -> u64 {
        self.state.read().accessed_count
    }

    // == Touch ==
    /// Renews the item: resets the idle clock and bumps the access counter.
    ///
    /// The table calls this on every successful lookup, which is what makes
    /// expiration sliding rather than absolute.
    pub fn touch(&self) {
        let mut state = self.state.write();
        state.accessed_on = Instant::now();
        state.accessed_count += 1;
    }

    // == Expire Callbacks ==
    /// Registers an observer to run when this item is evicted or removed.
    pub fn add_expire_callback(&self, f: impl Fn(&K, &V) + Send + Sync + 'static) {
        self.state.write().expire_callbacks.push(Arc::new(f));
    }

    /// Drops all observers registered on this item.
    pub fn clear_expire_callbacks(&self) {
        self.state.write().expire_callbacks.clear();
    }

    /// Snapshot of the item's observers, taken so they can be invoked without
    /// holding the item's lock.
    pub(crate) fn expire_callbacks(&self) -> Vec<ExpireCallback<K, V>> {
        self.state.read().expire_callbacks.clone()
    }
}
