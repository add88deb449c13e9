//! Integration tests for the cache table
//!
//! Exercises lookup, renewal, active expiration, observer re-entrancy, and
//! the miss-loader end to end on a tokio runtime. Timing-sensitive tests use
//! short life spans with generous sleep margins.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use memotable::{CacheError, CacheItem, CacheTable};

// == Lookup Tests ==

#[tokio::test]
async fn data_on_empty_table_fails() {
    let table: CacheTable<String, String> = CacheTable::new("empty");

    let result = table.data(&"missing".to_string());
    assert!(matches!(result, Err(CacheError::NotFound)));
}

#[tokio::test]
async fn add_then_data_returns_value_and_counts_the_read() {
    let table = CacheTable::new("basic");
    table.add("k".to_string(), "v".to_string(), Duration::from_secs(60));

    let item = table.data(&"k".to_string()).unwrap();
    assert_eq!(item.value(), "v");
    assert_eq!(item.access_count(), 1);

    let again = table.data(&"k".to_string()).unwrap();
    assert_eq!(again.access_count(), 2);
}

// == Active Expiration Tests ==

#[tokio::test]
async fn short_lived_entries_expire_once_idle() {
    let table: CacheTable<&str, &str> = CacheTable::new("kv");
    table.add("weak", "tyy", Duration::from_millis(6));
    table.add("strong", "kem", Duration::from_millis(5));

    let weak = table.data(&"weak").unwrap();
    let strong = table.data(&"strong").unwrap();
    assert_eq!(*weak.value(), "tyy");
    assert_eq!(*strong.value(), "kem");
    assert_eq!(weak.access_count(), 1);
    assert_eq!(strong.access_count(), 1);

    sleep(Duration::from_millis(20)).await;

    assert!(matches!(table.data(&"weak"), Err(CacheError::NotFound)));
    assert!(table.is_empty());
}

#[tokio::test]
async fn renewal_resets_the_idle_clock() {
    let table: CacheTable<&str, u32> = CacheTable::new("renew");
    table.add("job", 7, Duration::from_millis(150));

    sleep(Duration::from_millis(100)).await;
    table.data(&"job").unwrap();

    // Past the original deadline now, but the renewal above reset the clock.
    sleep(Duration::from_millis(100)).await;
    let item = table.data(&"job").unwrap();
    assert_eq!(*item.value(), 7);

    // Left idle, the entry finally expires.
    sleep(Duration::from_millis(300)).await;
    assert!(matches!(table.data(&"job"), Err(CacheError::NotFound)));
}

#[tokio::test]
async fn adding_a_shorter_lived_entry_tightens_the_timer() {
    let table: CacheTable<&str, &str> = CacheTable::new("tighten");
    table.add("slow", "s", Duration::from_secs(60));
    table.add("fast", "f", Duration::from_millis(10));

    sleep(Duration::from_millis(50)).await;

    // The timer armed for the 60s entry must have been tightened to the 10ms
    // one, well before its own deadline.
    assert!(!table.exists(&"fast"));
    assert!(table.data(&"slow").is_ok());
}

#[tokio::test]
async fn sweep_rearms_for_remaining_entries_after_an_eviction() {
    let table: CacheTable<&str, &str> = CacheTable::new("rearm");
    table.add("first", "1", Duration::from_millis(10));
    table.add("second", "2", Duration::from_millis(60));

    sleep(Duration::from_millis(30)).await;
    assert!(!table.exists(&"first"));
    assert!(table.exists(&"second"));

    // The sweep that evicted "first" must have rearmed for "second".
    sleep(Duration::from_millis(80)).await;
    assert!(table.is_empty());
}

#[tokio::test]
async fn zero_life_span_never_expires() {
    let table: CacheTable<&str, &str> = CacheTable::new("pinned");
    table.add("forever", "f", Duration::ZERO);
    table.add("brief", "b", Duration::from_millis(5));

    sleep(Duration::from_millis(40)).await;

    assert!(!table.exists(&"brief"));
    assert!(table.exists(&"forever"));
}

// == Observer Tests ==

#[tokio::test]
async fn after_add_observers_see_every_insert() {
    let table: CacheTable<&str, &str> = CacheTable::new("hooks");
    let added = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&added);
    table.on_after_add(move |_key, _value| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    table.add("a", "1", Duration::ZERO);
    table.add("b", "2", Duration::ZERO);
    assert_eq!(added.load(Ordering::SeqCst), 2);

    table.clear_after_add();
    table.add("c", "3", Duration::ZERO);
    assert_eq!(added.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn before_delete_observers_run_on_remove_and_eviction() {
    let table: CacheTable<String, String> = CacheTable::new("hooks");
    let deleted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&deleted);
    table.on_before_delete(move |_key, _value| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    table.add("gone".to_string(), "x".to_string(), Duration::ZERO);
    table.remove(&"gone".to_string());
    assert_eq!(deleted.load(Ordering::SeqCst), 1);

    table.add("stale".to_string(), "y".to_string(), Duration::from_millis(10));
    sleep(Duration::from_millis(50)).await;
    assert_eq!(deleted.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn before_delete_observers_skip_missing_keys() {
    let table: CacheTable<String, String> = CacheTable::new("hooks");
    let deleted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&deleted);
    table.on_before_delete(move |_key, _value| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    table.remove(&"never-existed".to_string());
    assert_eq!(deleted.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn observers_may_reenter_the_table_without_deadlock() {
    let table: CacheTable<String, String> = CacheTable::new("reentrant");
    let handle = table.clone();
    table.on_before_delete(move |key, value| {
        handle.add(format!("{key}/tombstone"), value.clone(), Duration::ZERO);
    });

    table.add("doomed".to_string(), "x".to_string(), Duration::ZERO);
    table.remove(&"doomed".to_string());

    assert!(!table.exists(&"doomed".to_string()));
    assert!(table.exists(&"doomed/tombstone".to_string()));
}

#[tokio::test]
async fn expire_callbacks_fire_when_their_item_goes() {
    let table: CacheTable<&str, &str> = CacheTable::new("expire");
    table.add("brief", "b", Duration::from_millis(10));

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    let item = table.data(&"brief").unwrap();
    item.add_expire_callback(move |_key, _value| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    sleep(Duration::from_millis(50)).await;

    assert!(!table.exists(&"brief"));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

// == Loader Tests ==

#[tokio::test]
async fn loader_materializes_missing_keys() {
    let table: CacheTable<String, String> = CacheTable::new("loader");
    table.set_loader(|key: &String| {
        CacheItem::new(key.clone(), format!("loaded-{key}"), Duration::from_secs(1))
    });

    let returned = table.data(&"ghost".to_string()).unwrap();
    assert_eq!(returned.value(), "loaded-ghost");
    assert!(table.exists(&"ghost".to_string()));

    // The loader's item is handed back directly; the stored copy is a
    // distinct object.
    let stored = table.data(&"ghost".to_string()).unwrap();
    assert!(!Arc::ptr_eq(&returned, &stored));
}

#[tokio::test]
async fn loaded_entries_expire_like_any_other() {
    let table: CacheTable<String, String> = CacheTable::new("loader");
    table.set_loader(|key: &String| {
        CacheItem::new(key.clone(), "transient".to_string(), Duration::from_millis(10))
    });

    table.data(&"blip".to_string()).unwrap();
    assert!(table.exists(&"blip".to_string()));

    sleep(Duration::from_millis(50)).await;
    assert!(!table.exists(&"blip".to_string()));
}

#[tokio::test]
async fn clearing_the_loader_restores_miss_errors() {
    let table: CacheTable<String, String> = CacheTable::new("loader");
    table.set_loader(|key: &String| {
        CacheItem::new(key.clone(), "x".to_string(), Duration::ZERO)
    });
    table.data(&"first".to_string()).unwrap();

    table.clear_loader();

    assert!(matches!(
        table.data(&"second".to_string()),
        Err(CacheError::NotFound)
    ));
}

// == Flush Tests ==

#[tokio::test]
async fn flush_drops_everything() {
    let table: CacheTable<&str, &str> = CacheTable::new("flush");
    table.add("a", "1", Duration::from_secs(60));
    table.add("b", "2", Duration::ZERO);

    table.flush();

    assert!(table.is_empty());
    assert!(matches!(table.data(&"a"), Err(CacheError::NotFound)));
}
