use std::sync::{Arc, Mutex};

use futures::channel::oneshot;

use crate::firestore::api::client::FirestoreClient;
use crate::firestore::api::reference::DocumentReference;
use crate::firestore::api::snapshot::DocumentSnapshot;
use crate::firestore::api::source::ListenOptions;
use crate::firestore::error::{internal_error, missing_snapshot, FirestoreError, FirestoreResult};
use crate::firestore::value::MapValue;

impl FirestoreClient {
    /// Overwrites a document and resolves once the write is visible locally.
    ///
    /// The write is queued without waiting for the server; completion means a
    /// listener on the document reported it with pending writes. Server
    /// acknowledgement is not awaited, so this returns promptly offline too.
    ///
    /// Failures (listener errors, or the document missing after the write) are
    /// logged at error level and returned.
    pub async fn set_doc_confirmed(&self, reference: &DocumentReference, data: impl Into<MapValue>) -> FirestoreResult<()> {
        let (sender, receiver) = oneshot::channel::<FirestoreResult<()>>();
        let sender = Arc::new(Mutex::new(Some(sender)));

        self.datastore().queue_set_document(reference.key(), data.into());

        let logger = self.logger().clone();
        let path = reference.path().canonical_string();
        let registration = self.datastore().listen_document(
            reference.key(),
            ListenOptions::with_metadata_changes(),
            Arc::new(move |snapshot: Option<DocumentSnapshot>, error: Option<FirestoreError>| {
                let Some(outcome) = confirmation(snapshot, error, &path) else {
                    return;
                };
                let Some(sender) = sender.lock().unwrap().take() else {
                    return;
                };
                if let Err(err) = &outcome {
                    logger.error(format!("Write to {path} was not confirmed: {err}"));
                }
                let _ = sender.send(outcome);
            }),
        );

        let outcome = receiver
            .await
            .unwrap_or_else(|_| Err(internal_error("Document listener closed before confirming the write")));
        registration.remove();
        outcome
    }
}

/// Maps one listener callback to a final outcome, or `None` to keep waiting.
fn confirmation(snapshot: Option<DocumentSnapshot>, error: Option<FirestoreError>, path: &str) -> Option<FirestoreResult<()>> {
    if let Some(error) = error {
        return Some(Err(error));
    }
    match snapshot {
        Some(snapshot) if snapshot.exists() => snapshot.has_pending_writes().then_some(Ok(())),
        _ => Some(Err(missing_snapshot(path))),
    }
}
