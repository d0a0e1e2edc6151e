use std::sync::Arc;

use crate::firestore::api::query::{Query, QuerySnapshot};
use crate::firestore::api::reference::{CollectionReference, DocumentReference};
use crate::firestore::api::snapshot::{DocumentSnapshot, SnapshotMetadata};
use crate::firestore::api::source::Source;
use crate::firestore::error::FirestoreResult;
use crate::firestore::logger::LOGGER;
use crate::firestore::remote::datastore::{Datastore, InMemoryDatastore};
use crate::logger::Logger;

/// Async front end over a [`Datastore`].
///
/// Cloning is cheap; clones share the datastore and the logger.
#[derive(Clone)]
pub struct FirestoreClient {
    datastore: Arc<dyn Datastore>,
    logger: Logger,
}

impl FirestoreClient {
    /// Creates a client backed by the supplied datastore implementation.
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self {
            datastore,
            logger: LOGGER.clone(),
        }
    }

    /// Returns a client that stores documents in memory only, along with the
    /// datastore handle used to drive it (connectivity, acknowledgements).
    pub fn with_in_memory() -> (Self, InMemoryDatastore) {
        let datastore = InMemoryDatastore::new();
        (Self::new(Arc::new(datastore.clone())), datastore)
    }

    /// Routes this client's diagnostics to `logger` instead of the shared
    /// `@firebase/firestore` logger.
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub(crate) fn datastore(&self) -> &Arc<dyn Datastore> {
        &self.datastore
    }

    pub fn collection(&self, path: &str) -> FirestoreResult<CollectionReference> {
        CollectionReference::from_string(path)
    }

    pub fn doc(&self, path: &str) -> FirestoreResult<DocumentReference> {
        DocumentReference::from_string(path)
    }

    /// Reads one document from `source`.
    ///
    /// A document missing on the server yields a snapshot whose `exists()` is
    /// false; a document missing from the cache (with [`Source::Cache`]) fails.
    pub async fn get_doc(&self, reference: &DocumentReference, source: Source) -> FirestoreResult<DocumentSnapshot> {
        self.datastore.get_document(reference.key(), source).await
    }

    /// Like [`get_doc`](Self::get_doc) but any failure becomes `None`.
    pub async fn get_doc_or_none(&self, reference: &DocumentReference, source: Source) -> Option<DocumentSnapshot> {
        let result = self.get_doc(reference, source).await;
        self.or_none(result, || format!("get_doc({reference}, {source:?})"))
    }

    /// Executes `query` against `source`.
    pub async fn get_docs(&self, query: &Query, source: Source) -> FirestoreResult<QuerySnapshot> {
        let documents = self.datastore.run_query(&query.definition(), source).await?;
        let metadata = aggregate_metadata(&documents, source);
        Ok(QuerySnapshot::new(documents, metadata))
    }

    /// Like [`get_docs`](Self::get_docs) but any failure becomes `None`.
    pub async fn get_docs_or_none(&self, query: &Query, source: Source) -> Option<QuerySnapshot> {
        let result = self.get_docs(query, source).await;
        self.or_none(result, || format!("get_docs({}, {source:?})", query.collection_path()))
    }

    /// Reads every document of a collection.
    pub async fn get_collection(
        &self,
        collection: &CollectionReference,
        source: Source,
    ) -> FirestoreResult<QuerySnapshot> {
        self.get_docs(&collection.query(), source).await
    }

    pub async fn get_collection_or_none(
        &self,
        collection: &CollectionReference,
        source: Source,
    ) -> Option<QuerySnapshot> {
        self.get_docs_or_none(&collection.query(), source).await
    }

    /// Counts documents matching `query` on the server; `None` when the count
    /// cannot be obtained (offline, permission errors, ...).
    pub async fn count(&self, query: &Query) -> Option<i64> {
        let result = self.datastore.run_count(&query.definition()).await;
        self.or_none(result, || format!("count({})", query.collection_path()))
    }

    fn or_none<T, F>(&self, result: FirestoreResult<T>, describe: F) -> Option<T>
    where
        F: FnOnce() -> String,
    {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.logger.debug(format!("{} failed, returning none: {err}", describe()));
                None
            }
        }
    }
}

fn aggregate_metadata(documents: &[DocumentSnapshot], source: Source) -> SnapshotMetadata {
    let from_cache = match documents.first() {
        Some(first) => first.from_cache(),
        None => source == Source::Cache,
    };
    let pending = documents.iter().any(DocumentSnapshot::has_pending_writes);
    SnapshotMetadata::new(from_cache, pending)
}
