use std::sync::Arc;

use async_trait::async_trait;

use crate::firestore::api::{DocumentSnapshot, ListenOptions, QueryDefinition, QuerySnapshot, Source};
use crate::firestore::error::{FirestoreError, FirestoreResult};
use crate::firestore::model::DocumentKey;
use crate::firestore::value::MapValue;
use crate::util::subscribe::ListenerRegistration;

pub mod in_memory;

/// Listener callback: a snapshot, an error, or (for some upstream errors) both.
pub type SnapshotCallback<T> = Arc<dyn Fn(Option<T>, Option<FirestoreError>) + Send + Sync + 'static>;

/// The document database client this crate layers its async helpers on.
///
/// Implementations own transport, caching and real-time sync. Every read
/// resolves exactly once; listeners keep firing until their registration is
/// removed or dropped.
#[async_trait]
pub trait Datastore: Send + Sync + 'static {
    async fn get_document(&self, key: &DocumentKey, source: Source) -> FirestoreResult<DocumentSnapshot>;

    /// Runs a query; limit and start-after cursor travel inside the definition.
    async fn run_query(&self, query: &QueryDefinition, source: Source) -> FirestoreResult<Vec<DocumentSnapshot>>;

    /// Counts matching documents on the server without downloading them.
    async fn run_count(&self, query: &QueryDefinition) -> FirestoreResult<i64>;

    /// Queues a full overwrite of `key`. Completion is observed through listeners.
    fn queue_set_document(&self, key: &DocumentKey, data: MapValue);

    fn listen_document(
        &self,
        key: &DocumentKey,
        options: ListenOptions,
        callback: SnapshotCallback<DocumentSnapshot>,
    ) -> ListenerRegistration;

    fn listen_query(
        &self,
        query: &QueryDefinition,
        options: ListenOptions,
        callback: SnapshotCallback<QuerySnapshot>,
    ) -> ListenerRegistration;
}

pub use in_memory::InMemoryDatastore;
