//! Polling document store client.
//!
//! The document strategy owns one [`mongodb`] client. `connect` runs on a
//! background task that attempts the native connect plus a ping, and on
//! failure simply tries again after a fixed short delay -- no backoff
//! growth, no attempt cap. The first success opens the readiness gate;
//! [`DocumentStore::client`] parks callers on that gate.
//!
//! [`DocumentStore::db`] and the handles below are thin accessors over the
//! native driver. Calling them before readiness was awaited is a caller
//! bug and fails with [`StoreError::NotConnected`] rather than retrying.
//! Every collection operation passes the native result or error through
//! verbatim.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use mongodb::bson::{Bson, Document, doc};
use mongodb::options::WriteModel;
use mongodb::results::{
    CreateIndexResult, DeleteResult, InsertManyResult, InsertOneResult,
    SummaryBulkWriteResult, UpdateResult,
};
use mongodb::{Client, Collection, Cursor, Database, IndexModel};
use tokio::task::JoinHandle;

use berth_core::gate::ReadinessGate;

use crate::error::StoreError;

/// Delay between connect attempts.
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Retry `connect` every `delay` until the first success, then publish the
/// handle through `gate`. No backoff growth, no attempt cap.
async fn poll_until_ready<T, E, F, Fut>(gate: &ReadinessGate<T>, delay: Duration, mut connect: F)
where
    T: Clone,
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u64 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        match connect().await {
            Ok(handle) => {
                tracing::info!(attempt, "document store connected");
                gate.open(handle);
                break;
            }
            Err(err) => {
                tracing::debug!(attempt, error = %err, "document connect failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// How to reach the document store: origin `host:port` fragments plus
/// driver options rendered as a URL query string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentEndpoint {
    /// `host:port` fragments, joined with commas in the connection URL.
    pub origins: Vec<String>,
    /// Driver options serialized as `key=value` query parameters.
    pub params: BTreeMap<String, String>,
}

impl DocumentEndpoint {
    /// Create an endpoint for a single origin with no parameters.
    pub fn new(origin: &str) -> Self {
        Self {
            origins: vec![origin.to_owned()],
            params: BTreeMap::new(),
        }
    }

    /// Render the `mongodb://` connection URL.
    pub fn connection_url(&self) -> String {
        let mut url = String::from("mongodb://");
        url.push_str(&self.origins.join(","));
        if !self.params.is_empty() {
            url.push_str("/?");
            let query = self
                .params
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join("&");
            url.push_str(&query);
        }
        url
    }
}

/// Polling client for the document store.
pub struct DocumentStore {
    url: String,
    gate: ReadinessGate<Client>,
    retry_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl DocumentStore {
    /// Create a store for `endpoint`. No I/O happens until
    /// [`DocumentStore::connect`].
    pub fn new(endpoint: &DocumentEndpoint) -> Self {
        Self {
            url: endpoint.connection_url(),
            gate: ReadinessGate::new(),
            retry_task: tokio::sync::Mutex::new(None),
        }
    }

    /// The connection URL this store targets.
    pub fn connection_url(&self) -> &str {
        &self.url
    }

    async fn try_connect(&self) -> Result<Client, mongodb::error::Error> {
        let client = Client::with_uri_str(&self.url).await?;
        // The driver connects lazily; ping to prove the deployment is
        // actually reachable before publishing the client.
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok(client)
    }

    /// Start connecting on a background task, retrying every 100ms until
    /// the first success opens the readiness gate. Idempotent: a second
    /// call while a retry loop is running (or after it succeeded) is a
    /// no-op.
    pub async fn connect(self: &Arc<Self>) {
        let mut task = self.retry_task.lock().await;
        if self.gate.is_open() || task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        let store = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            let connect = {
                let store = Arc::clone(&store);
                move || {
                    let store = Arc::clone(&store);
                    async move { store.try_connect().await }
                }
            };
            poll_until_ready(&store.gate, RETRY_DELAY, connect).await;
        }));
    }

    /// Suspend until the client is connected, then return it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Gate`] only if the store is torn down while
    /// waiting; an unreachable deployment keeps the caller parked.
    pub async fn client(&self) -> Result<Client, StoreError> {
        Ok(self.gate.wait().await?)
    }

    /// Whether the first connect has completed.
    pub fn is_connected(&self) -> bool {
        self.gate.is_open()
    }

    /// A handle on the named database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotConnected`] if called before readiness was
    /// awaited -- this path never retries.
    pub fn db(&self, name: &str) -> Result<DocumentDb, StoreError> {
        let client = self.gate.try_get().ok_or(StoreError::NotConnected)?;
        Ok(DocumentDb {
            db: client.database(name),
        })
    }

    /// Execute a batch of write models across collections in one driver
    /// call.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotConnected`] before readiness, otherwise
    /// the native result or error verbatim.
    pub async fn bulk_write(
        &self,
        models: Vec<WriteModel>,
    ) -> Result<SummaryBulkWriteResult, StoreError> {
        let client = self.gate.try_get().ok_or(StoreError::NotConnected)?;
        Ok(client.bulk_write(models).await?)
    }

    /// Stop the retry loop (if still running) and shut the client down.
    /// A store that never connected closes as a no-op. Never fails
    /// visibly.
    pub async fn close(&self) {
        if let Some(task) = self.retry_task.lock().await.take() {
            task.abort();
        }
        if let Some(client) = self.gate.try_get() {
            client.shutdown().await;
            tracing::info!(url = %self.url, "document client shut down");
        }
    }
}

/// Thin accessor over a native database handle.
pub struct DocumentDb {
    db: Database,
}

impl DocumentDb {
    /// A handle on the named collection.
    pub fn collection(&self, name: &str) -> DocumentCollection {
        DocumentCollection {
            collection: self.db.collection::<Document>(name),
        }
    }

    /// Create a collection explicitly (required for capped collections).
    ///
    /// # Errors
    ///
    /// Native error, verbatim.
    pub async fn create_collection(&self, name: &str) -> Result<(), StoreError> {
        self.db.create_collection(name).await?;
        Ok(())
    }

    /// Run a raw database command.
    ///
    /// # Errors
    ///
    /// Native error, verbatim.
    pub async fn run_command(&self, command: Document) -> Result<Document, StoreError> {
        Ok(self.db.run_command(command).await?)
    }
}

/// Pass-through wrapper over a native collection handle. Each operation
/// resolves with the native result or fails with the native error; the
/// broker adds no retry and no transformation of semantics.
pub struct DocumentCollection {
    collection: Collection<Document>,
}

impl DocumentCollection {
    /// Find all documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Native error, verbatim.
    pub async fn find(&self, filter: Document) -> Result<Cursor<Document>, StoreError> {
        Ok(self.collection.find(filter).await?)
    }

    /// Find one document matching `filter`.
    ///
    /// # Errors
    ///
    /// Native error, verbatim.
    pub async fn find_one(&self, filter: Document) -> Result<Option<Document>, StoreError> {
        Ok(self.collection.find_one(filter).await?)
    }

    /// Insert one document.
    ///
    /// # Errors
    ///
    /// Native error, verbatim.
    pub async fn insert_one(&self, document: Document) -> Result<InsertOneResult, StoreError> {
        Ok(self.collection.insert_one(document).await?)
    }

    /// Insert many documents.
    ///
    /// # Errors
    ///
    /// Native error, verbatim.
    pub async fn insert_many(
        &self,
        documents: Vec<Document>,
    ) -> Result<InsertManyResult, StoreError> {
        Ok(self.collection.insert_many(documents).await?)
    }

    /// Update the first document matching `filter`.
    ///
    /// # Errors
    ///
    /// Native error, verbatim.
    pub async fn update_one(
        &self,
        filter: Document,
        update: Document,
    ) -> Result<UpdateResult, StoreError> {
        Ok(self.collection.update_one(filter, update).await?)
    }

    /// Update every document matching `filter`.
    ///
    /// # Errors
    ///
    /// Native error, verbatim.
    pub async fn update_many(
        &self,
        filter: Document,
        update: Document,
    ) -> Result<UpdateResult, StoreError> {
        Ok(self.collection.update_many(filter, update).await?)
    }

    /// Delete the first document matching `filter`.
    ///
    /// # Errors
    ///
    /// Native error, verbatim.
    pub async fn delete_one(&self, filter: Document) -> Result<DeleteResult, StoreError> {
        Ok(self.collection.delete_one(filter).await?)
    }

    /// Delete every document matching `filter`.
    ///
    /// # Errors
    ///
    /// Native error, verbatim.
    pub async fn delete_many(&self, filter: Document) -> Result<DeleteResult, StoreError> {
        Ok(self.collection.delete_many(filter).await?)
    }

    /// Atomically update one document and return its previous state.
    ///
    /// # Errors
    ///
    /// Native error, verbatim.
    pub async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self.collection.find_one_and_update(filter, update).await?)
    }

    /// Atomically delete one document and return it.
    ///
    /// # Errors
    ///
    /// Native error, verbatim.
    pub async fn find_one_and_delete(
        &self,
        filter: Document,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self.collection.find_one_and_delete(filter).await?)
    }

    /// Run an aggregation pipeline.
    ///
    /// # Errors
    ///
    /// Native error, verbatim.
    pub async fn aggregate(
        &self,
        pipeline: Vec<Document>,
    ) -> Result<Cursor<Document>, StoreError> {
        Ok(self.collection.aggregate(pipeline).await?)
    }

    /// Count the documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Native error, verbatim.
    pub async fn count(&self, filter: Document) -> Result<u64, StoreError> {
        Ok(self.collection.count_documents(filter).await?)
    }

    /// Distinct values of `field` across documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Native error, verbatim.
    pub async fn distinct(
        &self,
        field: &str,
        filter: Document,
    ) -> Result<Vec<Bson>, StoreError> {
        Ok(self.collection.distinct(field, filter).await?)
    }

    /// Create an index.
    ///
    /// # Errors
    ///
    /// Native error, verbatim.
    pub async fn create_index(&self, index: IndexModel) -> Result<CreateIndexResult, StoreError> {
        Ok(self.collection.create_index(index).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[tokio::test(start_paused = true)]
    async fn gate_opens_only_after_the_fourth_attempt() {
        let gate = ReadinessGate::new();
        let attempts = Arc::new(AtomicU64::new(0));
        let connect = {
            let attempts = Arc::clone(&attempts);
            move || {
                let attempts = Arc::clone(&attempts);
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst).saturating_add(1);
                    if n < 4 { Err("connection refused") } else { Ok(n) }
                }
            }
        };

        poll_until_ready(&gate, RETRY_DELAY, connect).await;

        // Three failures, then the fourth attempt publishes the handle.
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(gate.try_get(), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_parked_across_failed_attempts_resolves_on_success() {
        let gate = Arc::new(ReadinessGate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.wait().await })
        };

        let attempts = Arc::new(AtomicU64::new(0));
        let connect = {
            let attempts = Arc::clone(&attempts);
            move || {
                let attempts = Arc::clone(&attempts);
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst).saturating_add(1);
                    if n < 4 { Err("connection refused") } else { Ok(n) }
                }
            }
        };
        poll_until_ready(&gate, RETRY_DELAY, connect).await;

        let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(joined, Ok(Ok(Ok(4)))));
    }

    #[test]
    fn url_single_origin_no_params() {
        let endpoint = DocumentEndpoint::new("127.0.0.1:27017");
        assert_eq!(endpoint.connection_url(), "mongodb://127.0.0.1:27017");
    }

    #[test]
    fn url_multiple_origins() {
        let endpoint = DocumentEndpoint {
            origins: vec!["a:27017".to_owned(), "b:27017".to_owned()],
            params: BTreeMap::new(),
        };
        assert_eq!(endpoint.connection_url(), "mongodb://a:27017,b:27017");
    }

    #[test]
    fn url_params_render_as_query_string() {
        let endpoint = DocumentEndpoint {
            origins: vec!["a:27017".to_owned()],
            params: BTreeMap::from([
                ("authSource".to_owned(), "admin".to_owned()),
                ("replicaSet".to_owned(), "rs0".to_owned()),
            ]),
        };
        assert_eq!(
            endpoint.connection_url(),
            "mongodb://a:27017/?authSource=admin&replicaSet=rs0"
        );
    }

    #[tokio::test]
    async fn db_before_readiness_is_not_connected() {
        let store = DocumentStore::new(&DocumentEndpoint::new("127.0.0.1:1"));
        assert!(matches!(store.db("app"), Err(StoreError::NotConnected)));
        assert!(!store.is_connected());
    }

    #[tokio::test]
    async fn close_on_a_never_connected_store_is_a_no_op() {
        let store = Arc::new(DocumentStore::new(&DocumentEndpoint::new("127.0.0.1:1")));
        store.connect().await;
        // The retry loop is live against an unreachable origin; close must
        // stop it without ever having connected.
        store.close().await;
        assert!(!store.is_connected());
    }
}
