mod client;
pub mod fields;
pub mod listen;
pub mod pagination;
mod query;
mod reference;
mod snapshot;
mod source;
mod write;

pub use client::FirestoreClient;
pub use fields::FieldAccess;
pub use listen::{until_server, SnapshotStream, SnapshotStreamExt, UntilServer};
pub use pagination::{PaginationOptions, Paginator, RefreshToken};
pub use query::{OrderBy, OrderDirection, Query, QueryDefinition, QuerySnapshot};
pub use reference::{CollectionReference, DocumentReference};
pub use snapshot::{DocumentSnapshot, HasSnapshotMetadata, SnapshotMetadata};
pub use source::{ListenOptions, Source};
