//! Memotable - an in-process key/value cache table
//!
//! Entries carry an idle-time budget (their life span): every successful
//! lookup renews the budget, and a self-rescheduling background sweep evicts
//! entries whose budget has elapsed. Observer hooks fire after inserts and
//! before deletes, and an optional loader turns misses into fresh entries.

pub mod cache;
pub mod error;
mod tasks;

pub use cache::{CacheItem, CacheTable, ExpireCallback, ItemObserver, LoadItemFn};
pub use error::{CacheError, Result};
