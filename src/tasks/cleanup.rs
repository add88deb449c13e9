//! Expiration Timer Task
//!
//! One-shot background task that fires the table's expiration sweep.
//!
//! Unlike a fixed-interval poller, the timer is armed for exactly the delay
//! until the next item can expire. The sweep it triggers recomputes that
//! delay and arms a fresh timer, so each table carries at most one live
//! timer, replaced wholesale on every pass.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::table::TableInner;

/// Spawns the sweep timer: sleep for `delay`, then run the table's
/// expiration sweep.
///
/// The returned handle is stored by the table and aborted when the timer is
/// replaced or the table is flushed. The spawned task holds a handle to the
/// table state, keeping it alive until the timer fires or is aborted.
pub(crate) fn spawn_sweep_timer<K, V>(
    table: Arc<TableInner<K, V>>,
    delay: Duration,
) -> JoinHandle<()>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        table.emit(|| debug!(table = %table.name(), "expiration timer fired"));
        table.check_expire();
    })
}
