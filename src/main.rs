//! Memotable demo
//!
//! Walks the cache table surface end to end: observer hooks, short-lived
//! entries expiring once idle, and the miss-loader reviving an expired key.
//!
//! Run with `RUST_LOG=memotable=debug` to watch the sweep rearm itself.

use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memotable::{CacheItem, CacheTable};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber with env filter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memotable=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let sessions: CacheTable<String, String> = CacheTable::new("sessions");

    sessions.on_after_add(|key, _value| {
        info!(%key, "session stored");
    });
    sessions.on_before_delete(|key, _value| {
        info!(%key, "session dropped");
    });

    sessions.add(
        "alice".to_string(),
        "token-a41".to_string(),
        Duration::from_millis(60),
    );
    sessions.add(
        "bob".to_string(),
        "token-b17".to_string(),
        Duration::from_millis(40),
    );

    let alice = sessions.data(&"alice".to_string())?;
    info!(key = %alice.key(), value = %alice.value(), reads = alice.access_count(), "read back");

    // Let both idle budgets elapse; the sweep evicts each at its own deadline.
    tokio::time::sleep(Duration::from_millis(150)).await;

    match sessions.data(&"alice".to_string()) {
        Ok(item) => info!(value = %item.value(), "still cached"),
        Err(err) => info!(%err, "alice is gone"),
    }

    // A loader turns misses into fresh entries.
    sessions.set_loader(|key: &String| {
        CacheItem::new(key.clone(), format!("token-{key}"), Duration::from_secs(1))
    });
    let revived = sessions.data(&"alice".to_string())?;
    info!(value = %revived.value(), "revived through the loader");

    Ok(())
}
