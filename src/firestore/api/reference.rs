use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::fmt::{Display, Formatter};

use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::{DocumentKey, ResourcePath};

use super::query::Query;

const AUTO_ID_LENGTH: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionReference {
    path: ResourcePath,
}

impl CollectionReference {
    pub fn new(path: ResourcePath) -> FirestoreResult<Self> {
        if path.len() % 2 == 0 {
            return Err(invalid_argument(format!(
                "Collection references need an odd number of segments, `{path}` has {}",
                path.len()
            )));
        }
        Ok(Self { path })
    }

    pub fn from_string(path: &str) -> FirestoreResult<Self> {
        Self::new(ResourcePath::from_string(path)?)
    }

    /// The full resource path of the collection (e.g. `rooms/eros/messages`).
    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    /// The last segment of the collection path.
    pub fn id(&self) -> &str {
        self.path.last_segment().unwrap_or_default()
    }

    /// Returns a reference to the document identified by `document_id`.
    ///
    /// When `document_id` is `None`, an auto-ID is generated.
    pub fn doc(&self, document_id: Option<&str>) -> FirestoreResult<DocumentReference> {
        let id = document_id
            .map(str::to_string)
            .unwrap_or_else(generate_auto_id);
        if id.is_empty() || id.contains('/') {
            return Err(invalid_argument(format!("Invalid document ID `{id}`")));
        }
        let key = DocumentKey::from_path(self.path.child(id))?;
        Ok(DocumentReference::from_key(key))
    }

    /// Creates an unfiltered query over this collection.
    pub fn query(&self) -> Query {
        Query::new(self.path.clone())
    }
}

impl Display for CollectionReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CollectionReference({})", self.path)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentReference {
    key: DocumentKey,
}

impl DocumentReference {
    pub fn from_key(key: DocumentKey) -> Self {
        Self { key }
    }

    pub fn from_string(path: &str) -> FirestoreResult<Self> {
        Ok(Self::from_key(DocumentKey::from_string(path)?))
    }

    /// The document identifier (the last segment of its path).
    pub fn id(&self) -> &str {
        self.key.id()
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    /// The full resource path to the document.
    pub fn path(&self) -> &ResourcePath {
        self.key.path()
    }

    /// The collection containing this document.
    pub fn parent(&self) -> CollectionReference {
        CollectionReference {
            path: self.key.collection_path(),
        }
    }
}

impl Display for DocumentReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "DocumentReference({})", self.key)
    }
}

fn generate_auto_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .take(AUTO_ID_LENGTH)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_ids_are_generated() {
        let cities = CollectionReference::from_string("cities").unwrap();
        let doc = cities.doc(None).unwrap();
        assert_eq!(doc.id().len(), AUTO_ID_LENGTH);
        assert_eq!(doc.parent(), cities);
    }

    #[test]
    fn rejects_nested_ids() {
        let cities = CollectionReference::from_string("cities").unwrap();
        assert!(cities.doc(Some("sf/landmarks")).is_err());
        assert!(CollectionReference::from_string("cities/sf").is_err());
    }
}
