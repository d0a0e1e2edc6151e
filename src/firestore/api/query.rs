use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::{DocumentKey, ResourcePath};

use super::snapshot::{DocumentSnapshot, HasSnapshotMetadata, SnapshotMetadata};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Ascending,
    Descending,
}

/// Sort key applied before the document id tie-breaker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    field: String,
    direction: OrderDirection,
}

impl OrderBy {
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }
}

/// A scan over one collection, optionally ordered, limited and offset by a cursor.
///
/// Queries are immutable: every builder method returns a new query.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    collection_path: ResourcePath,
    order_by: Option<OrderBy>,
    limit: Option<u32>,
    start_after: Option<DocumentSnapshot>,
}

impl Query {
    pub(crate) fn new(collection_path: ResourcePath) -> Self {
        Self {
            collection_path,
            order_by: None,
            limit: None,
            start_after: None,
        }
    }

    /// Returns the full resource path to the targeted collection.
    pub fn collection_path(&self) -> &ResourcePath {
        &self.collection_path
    }

    /// Orders results by a top-level field.
    pub fn order_by(&self, field: &str, direction: OrderDirection) -> FirestoreResult<Self> {
        if field.is_empty() || field.contains('/') {
            return Err(invalid_argument(format!("Invalid field name `{field}` for order_by")));
        }
        let mut query = self.clone();
        query.order_by = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        Ok(query)
    }

    /// Caps the number of returned documents. A limit of zero is rejected.
    pub fn limit(&self, limit: u32) -> FirestoreResult<Self> {
        if limit == 0 {
            return Err(invalid_argument("Query limit must be greater than zero"));
        }
        let mut query = self.clone();
        query.limit = Some(limit);
        Ok(query)
    }

    /// Starts results strictly after `document` in the query order.
    pub fn start_after(&self, document: &DocumentSnapshot) -> Self {
        let mut query = self.clone();
        query.start_after = Some(document.clone());
        query
    }

    pub fn definition(&self) -> QueryDefinition {
        QueryDefinition {
            collection_path: self.collection_path.clone(),
            order_by: self.order_by.clone(),
            limit: self.limit,
            start_after: self.start_after.clone(),
        }
    }
}

/// What a datastore needs to execute a [`Query`].
#[derive(Clone, Debug)]
pub struct QueryDefinition {
    collection_path: ResourcePath,
    order_by: Option<OrderBy>,
    limit: Option<u32>,
    start_after: Option<DocumentSnapshot>,
}

impl QueryDefinition {
    pub fn collection_path(&self) -> &ResourcePath {
        &self.collection_path
    }

    pub fn order_by(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn start_after(&self) -> Option<&DocumentSnapshot> {
        self.start_after.as_ref()
    }

    pub fn matches_collection(&self, key: &DocumentKey) -> bool {
        key.collection_path() == self.collection_path
    }
}

/// A snapshot containing the results of executing a query.
#[derive(Clone, Debug, PartialEq)]
pub struct QuerySnapshot {
    documents: Vec<DocumentSnapshot>,
    metadata: SnapshotMetadata,
}

impl QuerySnapshot {
    pub fn new(documents: Vec<DocumentSnapshot>, metadata: SnapshotMetadata) -> Self {
        Self { documents, metadata }
    }

    /// Returns all document snapshots in query order.
    pub fn documents(&self) -> &[DocumentSnapshot] {
        &self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn into_documents(self) -> Vec<DocumentSnapshot> {
        self.documents
    }
}

impl HasSnapshotMetadata for QuerySnapshot {
    fn metadata(&self) -> &SnapshotMetadata {
        &self.metadata
    }
}

impl IntoIterator for QuerySnapshot {
    type Item = DocumentSnapshot;
    type IntoIter = std::vec::IntoIter<DocumentSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::api::CollectionReference;

    #[test]
    fn builders_leave_original_untouched() {
        let base = CollectionReference::from_string("cities").unwrap().query();
        let limited = base.limit(5).unwrap();
        assert_eq!(base.definition().limit(), None);
        assert_eq!(limited.definition().limit(), Some(5));
    }

    #[test]
    fn zero_limit_is_rejected() {
        let query = CollectionReference::from_string("cities").unwrap().query();
        let err = query.limit(0).unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }

    #[test]
    fn start_after_records_cursor() {
        let query = CollectionReference::from_string("cities").unwrap().query();
        let key = DocumentKey::from_string("cities/la").unwrap();
        let cursor = DocumentSnapshot::new(key, None, SnapshotMetadata::default());
        let definition = query.start_after(&cursor).definition();
        assert_eq!(definition.start_after().map(DocumentSnapshot::id), Some("la"));
    }
}
