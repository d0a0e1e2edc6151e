use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::firestore::api::{
    DocumentSnapshot, ListenOptions, OrderDirection, QueryDefinition, QuerySnapshot, SnapshotMetadata, Source,
};
use crate::firestore::error::{unavailable, FirestoreError, FirestoreResult};
use crate::firestore::model::DocumentKey;
use crate::firestore::value::{FirestoreValue, MapValue, ValueKind};
use crate::util::subscribe::ListenerRegistration;

use super::{Datastore, SnapshotCallback};

/// A datastore kept entirely in process memory.
///
/// It models the parts of a real client this crate depends on: a local cache
/// that keeps serving while offline, writes that stay pending until the
/// (simulated) server acknowledges them, and listeners that receive an initial
/// snapshot followed by every change.
#[derive(Clone, Default)]
pub struct InMemoryDatastore {
    state: Arc<State>,
}

#[derive(Default)]
struct State {
    documents: Mutex<BTreeMap<DocumentKey, StoredDocument>>,
    listeners: Mutex<BTreeMap<u64, Listener>>,
    next_listener_id: AtomicU64,
    offline: AtomicBool,
    read_failures: Mutex<VecDeque<FirestoreError>>,
}

#[derive(Clone)]
struct StoredDocument {
    data: MapValue,
    pending: bool,
}

#[derive(Clone)]
struct Listener {
    target: ListenTarget,
    include_metadata_changes: bool,
}

#[derive(Clone)]
enum ListenTarget {
    Document(DocumentKey, SnapshotCallback<DocumentSnapshot>),
    Query(QueryDefinition, SnapshotCallback<QuerySnapshot>),
}

/// A callback bound to the snapshot it is about to receive.
enum Delivery {
    Document(SnapshotCallback<DocumentSnapshot>, DocumentSnapshot),
    Query(SnapshotCallback<QuerySnapshot>, QuerySnapshot),
}

impl Delivery {
    fn run(self) {
        match self {
            Delivery::Document(callback, snapshot) => callback(Some(snapshot), None),
            Delivery::Query(callback, snapshot) => callback(Some(snapshot), None),
        }
    }
}

impl InMemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a document as if it had been synced from the server.
    pub fn insert(&self, key: DocumentKey, data: impl Into<MapValue>) {
        self.store(key, data.into(), false);
    }

    /// Removes a document and notifies listeners.
    pub fn remove(&self, key: &DocumentKey) {
        let removed = self.state.documents.lock().unwrap().remove(key).is_some();
        if removed {
            self.notify(|target| target.affects(key), false);
        }
    }

    /// Toggles simulated connectivity.
    ///
    /// While offline, server reads fail with `firestore/unavailable`, default
    /// reads are served from the cache and listeners report `from_cache`.
    pub fn set_online(&self, online: bool) {
        let was_offline = self.state.offline.swap(!online, AtomicOrdering::SeqCst);
        if was_offline == online {
            self.notify(|_| true, true);
        }
    }

    pub fn is_online(&self) -> bool {
        !self.state.offline.load(AtomicOrdering::SeqCst)
    }

    /// Simulates the server acknowledging every queued write.
    ///
    /// Returns how many documents were acknowledged; nothing happens offline.
    pub fn acknowledge_pending_writes(&self) -> usize {
        if !self.is_online() {
            return 0;
        }
        let acknowledged: Vec<DocumentKey> = {
            let mut documents = self.state.documents.lock().unwrap();
            documents
                .iter_mut()
                .filter(|(_, stored)| stored.pending)
                .map(|(key, stored)| {
                    stored.pending = false;
                    key.clone()
                })
                .collect()
        };
        if !acknowledged.is_empty() {
            self.notify(|target| acknowledged.iter().any(|key| target.affects(key)), true);
        }
        acknowledged.len()
    }

    /// Makes the next one-shot read (document, query or count) fail with `error`.
    pub fn inject_read_failure(&self, error: FirestoreError) {
        self.state.read_failures.lock().unwrap().push_back(error);
    }

    /// Delivers `error` to every listener, optionally alongside its current snapshot.
    pub fn emit_listener_error(&self, error: FirestoreError, with_snapshot: bool) {
        let listeners: Vec<Listener> = self.state.listeners.lock().unwrap().values().cloned().collect();
        for listener in listeners {
            match listener.target {
                ListenTarget::Document(key, callback) => {
                    let snapshot = with_snapshot.then(|| self.document_snapshot(&key));
                    callback(snapshot, Some(error.clone()));
                }
                ListenTarget::Query(definition, callback) => {
                    let snapshot = with_snapshot.then(|| self.query_snapshot(&definition));
                    callback(snapshot, Some(error.clone()));
                }
            }
        }
    }

    /// Number of listeners currently attached.
    pub fn listener_count(&self) -> usize {
        self.state.listeners.lock().unwrap().len()
    }

    fn store(&self, key: DocumentKey, data: MapValue, pending: bool) {
        self.state
            .documents
            .lock()
            .unwrap()
            .insert(key.clone(), StoredDocument { data, pending });
        self.notify(|target| target.affects(&key), false);
    }

    fn take_read_failure(&self) -> FirestoreResult<()> {
        match self.state.read_failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Resolves `source` to "serve from cache?", failing server reads while offline.
    fn serve_from_cache(&self, source: Source) -> FirestoreResult<bool> {
        match source {
            Source::Cache => Ok(true),
            Source::Default => Ok(!self.is_online()),
            Source::Server if self.is_online() => Ok(false),
            Source::Server => Err(unavailable(
                "Failed to reach the server because the client is offline",
            )),
        }
    }

    fn document_snapshot(&self, key: &DocumentKey) -> DocumentSnapshot {
        let from_cache = !self.is_online();
        let documents = self.state.documents.lock().unwrap();
        match documents.get(key) {
            Some(stored) => DocumentSnapshot::new(
                key.clone(),
                Some(stored.data.clone()),
                SnapshotMetadata::new(from_cache, stored.pending),
            ),
            None => DocumentSnapshot::new(key.clone(), None, SnapshotMetadata::new(from_cache, false)),
        }
    }

    fn query_snapshot(&self, definition: &QueryDefinition) -> QuerySnapshot {
        let from_cache = !self.is_online();
        let documents = self.evaluate(definition, from_cache);
        let pending = documents.iter().any(DocumentSnapshot::has_pending_writes);
        QuerySnapshot::new(documents, SnapshotMetadata::new(from_cache, pending))
    }

    fn evaluate(&self, definition: &QueryDefinition, from_cache: bool) -> Vec<DocumentSnapshot> {
        let mut results: Vec<DocumentSnapshot> = {
            let documents = self.state.documents.lock().unwrap();
            documents
                .iter()
                .filter(|(key, _)| definition.matches_collection(key))
                .map(|(key, stored)| {
                    DocumentSnapshot::new(
                        key.clone(),
                        Some(stored.data.clone()),
                        SnapshotMetadata::new(from_cache, stored.pending),
                    )
                })
                .collect()
        };

        results.sort_by(|left, right| compare_in_query_order(definition, left, right));

        if let Some(cursor) = definition.start_after() {
            results.retain(|snapshot| compare_in_query_order(definition, snapshot, cursor) == Ordering::Greater);
        }
        if let Some(limit) = definition.limit() {
            results.truncate(limit as usize);
        }
        results
    }

    /// Sends fresh snapshots to every listener whose target satisfies `affected`.
    ///
    /// Callbacks run after all locks are released so they may detach themselves.
    fn notify<F>(&self, affected: F, metadata_only: bool)
    where
        F: Fn(&ListenTarget) -> bool,
    {
        let listeners: Vec<Listener> = self
            .state
            .listeners
            .lock()
            .unwrap()
            .values()
            .filter(|listener| affected(&listener.target))
            .filter(|listener| !metadata_only || listener.include_metadata_changes)
            .cloned()
            .collect();

        let deliveries: Vec<Delivery> = listeners
            .into_iter()
            .map(|listener| self.delivery_for(listener.target))
            .collect();
        for delivery in deliveries {
            delivery.run();
        }
    }

    fn delivery_for(&self, target: ListenTarget) -> Delivery {
        match target {
            ListenTarget::Document(key, callback) => {
                let snapshot = self.document_snapshot(&key);
                Delivery::Document(callback, snapshot)
            }
            ListenTarget::Query(definition, callback) => {
                let snapshot = self.query_snapshot(&definition);
                Delivery::Query(callback, snapshot)
            }
        }
    }

    fn register(&self, target: ListenTarget, options: ListenOptions) -> ListenerRegistration {
        let id = self.state.next_listener_id.fetch_add(1, AtomicOrdering::SeqCst);
        let listener = Listener {
            target: target.clone(),
            include_metadata_changes: options.include_metadata_changes,
        };
        self.state.listeners.lock().unwrap().insert(id, listener);

        self.delivery_for(target).run();

        let state = Arc::downgrade(&self.state);
        ListenerRegistration::new(move || {
            if let Some(state) = state.upgrade() {
                state.listeners.lock().unwrap().remove(&id);
            }
        })
    }
}

impl ListenTarget {
    fn affects(&self, key: &DocumentKey) -> bool {
        match self {
            ListenTarget::Document(target, _) => target == key,
            ListenTarget::Query(definition, _) => definition.matches_collection(key),
        }
    }
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    async fn get_document(&self, key: &DocumentKey, source: Source) -> FirestoreResult<DocumentSnapshot> {
        self.take_read_failure()?;
        let from_cache = self.serve_from_cache(source)?;
        let snapshot = self.document_snapshot(key);
        if from_cache && !snapshot.exists() {
            return Err(unavailable(format!(
                "Failed to get document {key} from cache; it may not be cached yet"
            )));
        }
        Ok(DocumentSnapshot::new(
            key.clone(),
            snapshot.map_value().cloned(),
            SnapshotMetadata::new(from_cache, snapshot.has_pending_writes()),
        ))
    }

    async fn run_query(&self, query: &QueryDefinition, source: Source) -> FirestoreResult<Vec<DocumentSnapshot>> {
        self.take_read_failure()?;
        let from_cache = self.serve_from_cache(source)?;
        Ok(self.evaluate(query, from_cache))
    }

    async fn run_count(&self, query: &QueryDefinition) -> FirestoreResult<i64> {
        self.take_read_failure()?;
        self.serve_from_cache(Source::Server)?;
        Ok(self.evaluate(query, false).len() as i64)
    }

    fn queue_set_document(&self, key: &DocumentKey, data: MapValue) {
        self.store(key.clone(), data, true);
    }

    fn listen_document(
        &self,
        key: &DocumentKey,
        options: ListenOptions,
        callback: SnapshotCallback<DocumentSnapshot>,
    ) -> ListenerRegistration {
        self.register(ListenTarget::Document(key.clone(), callback), options)
    }

    fn listen_query(
        &self,
        query: &QueryDefinition,
        options: ListenOptions,
        callback: SnapshotCallback<QuerySnapshot>,
    ) -> ListenerRegistration {
        self.register(ListenTarget::Query(query.clone(), callback), options)
    }
}

/// Orders by the query's sort field (missing fields sort as null), then by document key.
fn compare_in_query_order(definition: &QueryDefinition, left: &DocumentSnapshot, right: &DocumentSnapshot) -> Ordering {
    let (ordering, direction) = match definition.order_by() {
        Some(order) => {
            let null = FirestoreValue::null();
            let left_value = left.get(order.field()).unwrap_or(&null);
            let right_value = right.get(order.field()).unwrap_or(&null);
            (compare_values(left_value, right_value), order.direction())
        }
        None => (Ordering::Equal, OrderDirection::Ascending),
    };
    let ordering = ordering.then_with(|| left.key().cmp(right.key()));
    match direction {
        OrderDirection::Ascending => ordering,
        OrderDirection::Descending => ordering.reverse(),
    }
}

fn compare_values(left: &FirestoreValue, right: &FirestoreValue) -> Ordering {
    match (left.kind(), right.kind()) {
        (ValueKind::Boolean(a), ValueKind::Boolean(b)) => a.cmp(b),
        (ValueKind::Integer(a), ValueKind::Integer(b)) => a.cmp(b),
        (ValueKind::Double(a), ValueKind::Double(b)) => a.total_cmp(b),
        (ValueKind::Integer(a), ValueKind::Double(b)) => (*a as f64).total_cmp(b),
        (ValueKind::Double(a), ValueKind::Integer(b)) => a.total_cmp(&(*b as f64)),
        (ValueKind::Timestamp(a), ValueKind::Timestamp(b)) => a.cmp(b),
        (ValueKind::String(a), ValueKind::String(b)) => a.cmp(b),
        (ValueKind::Reference(a), ValueKind::Reference(b)) => a.cmp(b),
        (left, right) => type_rank(left).cmp(&type_rank(right)),
    }
}

fn type_rank(kind: &ValueKind) -> u8 {
    match kind {
        ValueKind::Null => 0,
        ValueKind::Boolean(_) => 1,
        ValueKind::Integer(_) | ValueKind::Double(_) => 2,
        ValueKind::Timestamp(_) => 3,
        ValueKind::String(_) => 4,
        ValueKind::Reference(_) => 5,
        ValueKind::GeoPoint(_) => 6,
        ValueKind::Array(_) => 7,
        ValueKind::Map(_) => 8,
    }
}
