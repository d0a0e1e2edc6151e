//! Async helpers over a Firestore-style document database client.

pub mod api;
pub mod error;
pub mod logger;
pub mod model;
pub mod remote;
pub mod value;

pub use api::{
    CollectionReference, DocumentReference, DocumentSnapshot, FieldAccess, FirestoreClient, PaginationOptions,
    Paginator, Query, QuerySnapshot, RefreshToken, SnapshotStreamExt, Source,
};
pub use error::{FirestoreError, FirestoreErrorCode, FirestoreResult};
