use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::stream::{FusedStream, Stream};
use futures::task::AtomicWaker;

use crate::firestore::api::client::FirestoreClient;
use crate::firestore::api::query::{Query, QuerySnapshot};
use crate::firestore::api::reference::DocumentReference;
use crate::firestore::api::snapshot::{DocumentSnapshot, HasSnapshotMetadata};
use crate::firestore::api::source::ListenOptions;
use crate::firestore::error::{FirestoreError, FirestoreResult};
use crate::firestore::remote::datastore::SnapshotCallback;
use crate::logger::Logger;
use crate::util::subscribe::ListenerRegistration;

/// Live snapshots of a query or document as a [`Stream`].
///
/// The stream owns the listener registration. Dropping the stream or calling
/// [`cancel`](Self::cancel) detaches the listener exactly once. Delivery is
/// at-most-latest: if the listener fires several times between two polls,
/// only the newest snapshot is yielded.
///
/// A listener error ends the stream after yielding it, except a
/// `permission-denied` error without a snapshot, which is dropped. That
/// combination is what listeners report while a user signs out and their
/// access is revoked under an open listener.
pub struct SnapshotStream<T> {
    mailbox: Arc<Mailbox<T>>,
    registration: Option<ListenerRegistration>,
    finished: bool,
}

struct Mailbox<T> {
    slot: Mutex<Slot<T>>,
    waker: AtomicWaker,
}

struct Slot<T> {
    latest: Option<T>,
    error: Option<FirestoreError>,
}

impl<T> Mailbox<T> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                latest: None,
                error: None,
            }),
            waker: AtomicWaker::new(),
        }
    }

    fn deliver(&self, snapshot: Option<T>, error: Option<FirestoreError>, logger: &Logger) {
        let ignored = {
            let mut slot = self.slot.lock().unwrap();
            if slot.error.is_some() {
                return;
            }
            match (snapshot, error) {
                (None, Some(error)) if error.is_permission_denied() => Some(Ignored::PermissionDenied(error)),
                (_, Some(error)) => {
                    slot.error = Some(error);
                    None
                }
                (Some(snapshot), None) => {
                    slot.latest = Some(snapshot);
                    None
                }
                (None, None) => Some(Ignored::Empty),
            }
        };
        match ignored {
            Some(Ignored::PermissionDenied(error)) => {
                logger.debug(format!("Ignoring listener error without snapshot: {error}"))
            }
            Some(Ignored::Empty) => logger.warn("Listener fired without a snapshot or an error"),
            None => self.waker.wake(),
        }
    }
}

/// Callbacks dropped by [`Mailbox::deliver`], logged once the slot is unlocked.
enum Ignored {
    PermissionDenied(FirestoreError),
    Empty,
}

enum Next<T> {
    Snapshot(T),
    Failed(FirestoreError),
    Waiting,
}

impl<T> SnapshotStream<T>
where
    T: Send + 'static,
{
    /// Hands `attach` the callback feeding this stream and keeps the registration it returns.
    pub(crate) fn listen<F>(logger: Logger, attach: F) -> Self
    where
        F: FnOnce(SnapshotCallback<T>) -> ListenerRegistration,
    {
        let mailbox = Arc::new(Mailbox::new());
        let sink = Arc::clone(&mailbox);
        let callback: SnapshotCallback<T> = Arc::new(move |snapshot: Option<T>, error: Option<FirestoreError>| {
            sink.deliver(snapshot, error, &logger)
        });
        let registration = attach(callback);
        Self {
            mailbox,
            registration: Some(registration),
            finished: false,
        }
    }
}

impl<T> SnapshotStream<T> {
    /// Detaches the listener and ends the stream.
    ///
    /// Calling it again, or dropping the stream afterwards, is a no-op.
    pub fn cancel(&mut self) {
        self.finished = true;
        if let Some(registration) = self.registration.take() {
            registration.remove();
        }
    }

    /// Whether the listener is still attached.
    pub fn is_listening(&self) -> bool {
        self.registration.is_some()
    }

    fn take_next(&self) -> Next<T> {
        let mut slot = self.mailbox.slot.lock().unwrap();
        if let Some(snapshot) = slot.latest.take() {
            return Next::Snapshot(snapshot);
        }
        match slot.error.clone() {
            Some(error) => Next::Failed(error),
            None => Next::Waiting,
        }
    }
}

impl<T> Stream for SnapshotStream<T> {
    type Item = FirestoreResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        self.mailbox.waker.register(cx.waker());
        match self.take_next() {
            Next::Snapshot(snapshot) => Poll::Ready(Some(Ok(snapshot))),
            Next::Failed(error) => {
                self.finished = true;
                self.cancel();
                Poll::Ready(Some(Err(error)))
            }
            Next::Waiting => Poll::Pending,
        }
    }
}

impl<T> FusedStream for SnapshotStream<T> {
    fn is_terminated(&self) -> bool {
        self.finished
    }
}

/// Ends a snapshot stream once the server has spoken.
///
/// Yields snapshots served from the cache, then the first snapshot that is
/// not, then ends. Errors are passed through and end the stream too. The
/// wrapped stream (and any listener it owns) is dropped as soon as it ends.
pub struct UntilServer<S> {
    inner: Option<S>,
}

impl<S, T> Stream for UntilServer<S>
where
    S: Stream<Item = FirestoreResult<T>> + Unpin,
    T: HasSnapshotMetadata,
{
    type Item = FirestoreResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };
        let item = match Pin::new(inner).poll_next(cx) {
            Poll::Ready(item) => item,
            Poll::Pending => return Poll::Pending,
        };
        let done = match &item {
            Some(Ok(snapshot)) => !snapshot.from_cache(),
            Some(Err(_)) | None => true,
        };
        if done {
            self.inner = None;
        }
        Poll::Ready(item)
    }
}

pub trait SnapshotStreamExt<T>: Stream<Item = FirestoreResult<T>> + Unpin + Sized
where
    T: HasSnapshotMetadata,
{
    /// See [`UntilServer`].
    fn until_server(self) -> UntilServer<Self> {
        UntilServer { inner: Some(self) }
    }
}

impl<S, T> SnapshotStreamExt<T> for S
where
    S: Stream<Item = FirestoreResult<T>> + Unpin,
    T: HasSnapshotMetadata,
{
}

/// Free-function form of [`SnapshotStreamExt::until_server`].
pub fn until_server<S, T>(stream: S) -> UntilServer<S>
where
    S: Stream<Item = FirestoreResult<T>> + Unpin,
    T: HasSnapshotMetadata,
{
    stream.until_server()
}

impl FirestoreClient {
    /// Streams snapshots of `query`'s results until dropped.
    pub fn query_snapshots(&self, query: &Query) -> SnapshotStream<QuerySnapshot> {
        self.query_snapshots_with_options(query, ListenOptions::default())
    }

    pub fn query_snapshots_with_options(&self, query: &Query, options: ListenOptions) -> SnapshotStream<QuerySnapshot> {
        let definition = query.definition();
        SnapshotStream::listen(self.logger().clone(), |callback| {
            self.datastore().listen_query(&definition, options, callback)
        })
    }

    /// Streams snapshots of one document until dropped.
    pub fn document_snapshots(&self, reference: &DocumentReference) -> SnapshotStream<DocumentSnapshot> {
        self.document_snapshots_with_options(reference, ListenOptions::default())
    }

    pub fn document_snapshots_with_options(
        &self,
        reference: &DocumentReference,
        options: ListenOptions,
    ) -> SnapshotStream<DocumentSnapshot> {
        SnapshotStream::listen(self.logger().clone(), |callback| {
            self.datastore().listen_document(reference.key(), options, callback)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::api::SnapshotMetadata;
    use crate::firestore::error::{permission_denied, unavailable};
    use crate::firestore::model::DocumentKey;
    use crate::firestore::value::{FirestoreValue, MapValue};
    use crate::test_support::TeardownCounter;
    use futures::{FutureExt, StreamExt};

    fn quiet_logger() -> Logger {
        let logger = Logger::new("@test/listen");
        logger.set_log_handler(|_, _, _| {});
        logger
    }

    fn capture_stream(counter: &TeardownCounter) -> (SnapshotStream<u32>, SnapshotCallback<u32>) {
        let mut captured = None;
        let stream = SnapshotStream::listen(quiet_logger(), |callback| {
            captured = Some(callback);
            counter.registration()
        });
        (stream, captured.unwrap())
    }

    #[test]
    fn cancel_tears_down_exactly_once() {
        let counter = TeardownCounter::new();
        let (mut stream, _callback) = capture_stream(&counter);
        assert!(stream.is_listening());
        stream.cancel();
        stream.cancel();
        assert_eq!(stream.next().now_or_never(), Some(None));
        drop(stream);
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn drop_tears_down() {
        let counter = TeardownCounter::new();
        let (stream, _callback) = capture_stream(&counter);
        drop(stream);
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn slow_consumer_sees_latest_snapshot() {
        let counter = TeardownCounter::new();
        let (mut stream, callback) = capture_stream(&counter);
        assert!(stream.next().now_or_never().is_none());
        callback(Some(1), None);
        callback(Some(2), None);
        assert_eq!(stream.next().now_or_never(), Some(Some(Ok(2))));
        assert!(stream.next().now_or_never().is_none());
    }

    #[test]
    fn permission_denied_without_snapshot_is_ignored() {
        let counter = TeardownCounter::new();
        let (mut stream, callback) = capture_stream(&counter);
        callback(None, Some(permission_denied("signed out")));
        assert!(stream.next().now_or_never().is_none());
        assert!(!stream.is_terminated());

        callback(Some(7), None);
        assert_eq!(stream.next().now_or_never(), Some(Some(Ok(7))));
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn other_errors_end_the_stream() {
        let counter = TeardownCounter::new();
        let (mut stream, callback) = capture_stream(&counter);
        callback(Some(3), Some(permission_denied("revoked with payload")));
        callback(Some(4), None);

        let item = stream.next().now_or_never().unwrap().unwrap();
        assert_eq!(item.unwrap_err().code_str(), "firestore/permission-denied");
        assert_eq!(stream.next().now_or_never(), Some(None));
        assert!(stream.is_terminated());
        assert_eq!(counter.count(), 1);
    }

    #[tokio::test]
    async fn document_stream_follows_datastore() {
        let (client, datastore) = FirestoreClient::with_in_memory();
        let client = client.with_logger(quiet_logger());
        let sf = client.doc("cities/sf").unwrap();
        let mut stream = client.document_snapshots(&sf);

        let first = stream.next().await.unwrap().unwrap();
        assert!(!first.exists());

        datastore.insert(sf.key().clone(), MapValue::from([("rank", FirestoreValue::from_integer(1))]));
        let second = stream.next().await.unwrap().unwrap();
        assert!(second.exists());

        datastore.emit_listener_error(permission_denied("signed out"), false);
        datastore.emit_listener_error(unavailable("backend down"), false);
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.code_str(), "firestore/unavailable");
        assert!(stream.next().await.is_none());
        assert_eq!(datastore.listener_count(), 0);
    }

    fn snapshot(from_cache: bool) -> FirestoreResult<DocumentSnapshot> {
        let key = DocumentKey::from_string("cities/sf").unwrap();
        Ok(DocumentSnapshot::new(key, None, SnapshotMetadata::new(from_cache, false)))
    }

    #[tokio::test]
    async fn until_server_stops_after_first_server_snapshot() {
        let source = futures::stream::iter(vec![snapshot(true), snapshot(true), snapshot(false), snapshot(true)]);
        let flags: Vec<bool> = source
            .until_server()
            .map(|item| item.unwrap().from_cache())
            .collect()
            .await;
        assert_eq!(flags, [true, true, false]);

        let only_server = futures::stream::iter(vec![snapshot(false), snapshot(false)]);
        assert_eq!(until_server(only_server).count().await, 1);
    }

    #[tokio::test]
    async fn until_server_ends_on_live_query_once_online() {
        let (client, datastore) = FirestoreClient::with_in_memory();
        let client = client.with_logger(quiet_logger());
        datastore.set_online(false);
        let cities = client.collection("cities").unwrap();
        let mut stream = client
            .query_snapshots_with_options(&cities.query(), ListenOptions::with_metadata_changes())
            .until_server();

        assert!(stream.next().await.unwrap().unwrap().from_cache());
        assert_eq!(datastore.listener_count(), 1);
        datastore.set_online(true);
        assert!(!stream.next().await.unwrap().unwrap().from_cache());
        assert_eq!(datastore.listener_count(), 0);
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn log_handler_may_feed_the_stream() {
        let counter = TeardownCounter::new();
        let slot: Arc<Mutex<Option<SnapshotCallback<u32>>>> = Arc::new(Mutex::new(None));
        let logger = Logger::new("@test/listen-reentrant");
        let feed = Arc::clone(&slot);
        logger.set_log_handler(move |_, _, _| {
            let callback = feed.lock().unwrap().clone();
            if let Some(callback) = callback {
                callback(Some(9), None);
            }
        });

        let mut stream = SnapshotStream::listen(logger, |callback| {
            *slot.lock().unwrap() = Some(callback);
            counter.registration()
        });
        let callback = slot.lock().unwrap().clone().unwrap();
        callback(None, None);
        callback(None, Some(permission_denied("signed out")));

        assert_eq!(stream.next().now_or_never(), Some(Some(Ok(9))));
        assert!(!stream.is_terminated());
    }
}
