//! Integration tests for the berth client strategies.
//!
//! These tests require live Docker services (`PostgreSQL`, a
//! Redis-compatible cache, and `MongoDB`). Run with:
//!
//! ```bash
//! docker compose up -d
//! cargo test -p berth-stores -- --ignored
//! docker compose down
//! ```
//!
//! All tests are marked `#[ignore]` so they are skipped during normal
//! `cargo test` runs. The failover tests additionally assume the services
//! publish on `127.0.0.1` only, so that another loopback address refuses
//! the connection.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc
)]

use std::sync::Arc;
use std::time::Duration;

use berth_core::EndpointDescriptor;
use berth_stores::{
    CacheEndpoint, CacheStore, DocumentEndpoint, DocumentStore, RelationalStore, StoreError,
};
use futures::TryStreamExt;
use mongodb::bson::doc;

/// `PostgreSQL` endpoint for the local Docker instance.
const POSTGRES_HOST: &str = "127.0.0.1";
const POSTGRES_PORT: u16 = 5432;

/// A loopback address nothing listens on; connections are refused.
const REFUSED_HOST: &str = "127.99.99.99";

/// Cache endpoint for the local Docker instance.
const CACHE_HOST: &str = "127.0.0.1";
const CACHE_PORT: u16 = 6379;

/// Document store origin for the local Docker instance.
const DOCUMENT_ORIGIN: &str = "127.0.0.1:27017";

fn postgres_descriptor(primary: &str) -> EndpointDescriptor {
    EndpointDescriptor::new(primary, POSTGRES_PORT)
        .with_user("berth")
        .with_credential("berth_dev")
        .with_database("berth")
}

// =============================================================================
// Relational store
// =============================================================================

#[tokio::test]
#[ignore = "requires live PostgreSQL instance (docker compose up -d)"]
async fn relational_acquire_and_release() {
    let store = RelationalStore::new(postgres_descriptor(POSTGRES_HOST));

    let mut lease = store.acquire().await.expect("failed to acquire");
    let row: (i32,) = sqlx::query_as("SELECT 1")
        .fetch_one(lease.connection())
        .await
        .expect("probe query failed");
    assert_eq!(row.0, 1);

    store.release(lease).await;
    assert_eq!(store.active_host().await, POSTGRES_HOST);
    assert!(!store.has_failed_over().await);

    store.close().await;
}

#[tokio::test]
#[ignore = "requires live PostgreSQL instance (docker compose up -d)"]
async fn relational_failover_to_secondary() {
    // Primary refuses; the secondary is the live instance.
    let descriptor =
        postgres_descriptor(REFUSED_HOST).with_secondary_host(POSTGRES_HOST);
    let store = RelationalStore::new(descriptor);

    store.create_pool().await.expect("failover connect failed");
    assert_eq!(store.active_host().await, POSTGRES_HOST);
    assert!(store.has_failed_over().await);

    // Acquire works against the flipped host.
    let lease = store.acquire().await.expect("failed to acquire after failover");
    store.release(lease).await;
    store.close().await;
}

#[tokio::test]
#[ignore = "requires live PostgreSQL instance (docker compose up -d)"]
async fn relational_failover_state_is_per_instance() {
    let descriptor =
        postgres_descriptor(REFUSED_HOST).with_secondary_host(POSTGRES_HOST);

    let first = RelationalStore::new(descriptor.clone());
    first.create_pool().await.expect("first instance failed");
    assert!(first.has_failed_over().await);

    // A second instance with the same descriptor performs its own check.
    let second = RelationalStore::new(descriptor);
    assert!(!second.has_failed_over().await);
    second.create_pool().await.expect("second instance failed");
    assert!(second.has_failed_over().await);

    first.close().await;
    second.close().await;
}

#[tokio::test]
#[ignore = "requires live PostgreSQL instance (docker compose up -d)"]
async fn relational_auth_failure_is_not_a_failover_trigger() {
    let descriptor = EndpointDescriptor::new(POSTGRES_HOST, POSTGRES_PORT)
        .with_secondary_host(REFUSED_HOST)
        .with_user("berth")
        .with_credential("wrong_password")
        .with_database("berth");
    let store = RelationalStore::new(descriptor);

    let err = store.create_pool().await.expect_err("expected auth failure");
    assert!(
        matches!(err, StoreError::AuthFailure(_)),
        "unexpected error: {err}"
    );
    // Auth failures never flip the active host.
    assert!(!store.has_failed_over().await);
    assert_eq!(store.active_host().await, POSTGRES_HOST);
}

#[tokio::test]
#[ignore = "requires live PostgreSQL instance (docker compose up -d)"]
async fn relational_concurrent_acquires_all_resolve() {
    let store = Arc::new(RelationalStore::new(postgres_descriptor(POSTGRES_HOST)));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            let lease = store.acquire().await.expect("acquire failed");
            store.release(lease).await;
        }));
    }
    for task in tasks {
        task.await.expect("acquire task panicked");
    }
    store.close().await;
}

// =============================================================================
// Cache store
// =============================================================================

#[tokio::test]
#[ignore = "requires live cache instance (docker compose up -d)"]
async fn cache_set_get_remove() {
    let store = Arc::new(CacheStore::new(CacheEndpoint::new(CACHE_HOST, CACHE_PORT)));
    store.connect().await.expect("failed to connect");

    store
        .set("berth:test:key", "value", Some(Duration::from_secs(60)))
        .await
        .expect("set failed");
    let value = store.get("berth:test:key").await.expect("get failed");
    assert_eq!(value.as_deref(), Some("value"));

    store.remove("berth:test:key").await.expect("remove failed");
    let value = store.get("berth:test:key").await.expect("get failed");
    assert_eq!(value, None);

    store.quit().await;
}

#[tokio::test]
#[ignore = "requires live cache instance (docker compose up -d)"]
async fn cache_fresh_connection_is_not_replaced() {
    let store = Arc::new(CacheStore::new(CacheEndpoint::new(CACHE_HOST, CACHE_PORT)));
    store.connect().await.expect("failed to connect");
    let first_stamp = store.last_refreshed_at().await.expect("no stamp");

    // A second connect against a fresh connection is a no-op.
    store.connect().await.expect("reconnect failed");
    let second_stamp = store.last_refreshed_at().await.expect("no stamp");
    assert_eq!(first_stamp, second_stamp);

    store.quit().await;
}

#[tokio::test]
#[ignore = "requires live cache instance (docker compose up -d)"]
async fn cache_stale_connection_is_replaced() {
    let store = Arc::new(CacheStore::with_refresh_interval(
        CacheEndpoint::new(CACHE_HOST, CACHE_PORT),
        Duration::from_millis(200),
    ));
    store.connect().await.expect("failed to connect");
    let first_stamp = store.last_refreshed_at().await.expect("no stamp");

    // Wait past the refresh interval; the sweep re-stamps the connection.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let second_stamp = store.last_refreshed_at().await.expect("no stamp");
    assert_ne!(first_stamp, second_stamp);

    store.quit().await;
}

#[tokio::test]
#[ignore = "requires live cache instance (docker compose up -d)"]
async fn cache_quit_stops_the_refresh_sweep() {
    let store = Arc::new(CacheStore::with_refresh_interval(
        CacheEndpoint::new(CACHE_HOST, CACHE_PORT),
        Duration::from_millis(200),
    ));
    store.connect().await.expect("failed to connect");
    store.quit().await;

    // No reconnect may occur after quit, even once the interval elapses.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!store.is_connected().await);
    assert!(matches!(store.get("k").await, Err(StoreError::NotReady)));
}

// =============================================================================
// Document store
// =============================================================================

#[tokio::test]
#[ignore = "requires live MongoDB instance (docker compose up -d)"]
async fn document_connect_and_crud() {
    let store = Arc::new(DocumentStore::new(&DocumentEndpoint::new(DOCUMENT_ORIGIN)));
    store.connect().await;
    let _client = store.client().await.expect("client never became ready");

    let collection = store
        .db("berth_test")
        .expect("db accessor failed after readiness")
        .collection("items");

    collection.delete_many(doc! {}).await.expect("cleanup failed");

    let inserted = collection
        .insert_one(doc! { "name": "alpha", "qty": 1 })
        .await
        .expect("insert failed");
    assert_ne!(inserted.inserted_id, mongodb::bson::Bson::Null);

    let found = collection
        .find_one(doc! { "name": "alpha" })
        .await
        .expect("find_one failed")
        .expect("document missing");
    assert_eq!(found.get_i32("qty").expect("qty missing"), 1);

    let updated = collection
        .update_one(doc! { "name": "alpha" }, doc! { "$set": { "qty": 2 } })
        .await
        .expect("update failed");
    assert_eq!(updated.modified_count, 1);

    let count = collection.count(doc! {}).await.expect("count failed");
    assert_eq!(count, 1);

    let cursor = collection.find(doc! {}).await.expect("find failed");
    let all: Vec<mongodb::bson::Document> =
        cursor.try_collect().await.expect("cursor drain failed");
    assert_eq!(all.len(), 1);

    collection
        .delete_many(doc! {})
        .await
        .expect("cleanup failed");
    store.close().await;
}

#[tokio::test]
#[ignore = "requires live MongoDB instance (docker compose up -d)"]
async fn document_client_waits_for_connect() {
    let store = Arc::new(DocumentStore::new(&DocumentEndpoint::new(DOCUMENT_ORIGIN)));

    // Ask for the client before connect has even started.
    let waiter = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.client().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    store.connect().await;

    waiter
        .await
        .expect("waiter panicked")
        .expect("client never became ready");
    store.close().await;
}
