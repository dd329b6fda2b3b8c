use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use mongodb::bson::{Bson, Document, oid::ObjectId};

use super::collection::DocumentCollection;
use crate::error::StoreError;
use crate::mapper::{ID_KEY, Identity};

/// In-process collection used in place of a live cluster. Filters support
/// plain equality and `{"$in": [...]}` per key.
pub struct MemoryCollection {
    name: String,
    state: Mutex<State>,
    round_trips: AtomicU64,
}

#[derive(Default)]
struct State {
    documents: Vec<Document>,
    ids: HashSet<ObjectId>,
}

impl MemoryCollection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(State::default()),
            round_trips: AtomicU64::new(0),
        }
    }

    pub fn with_documents(name: &str, documents: Vec<Document>) -> Self {
        let collection = Self::new(name);
        {
            let mut state = collection.lock();
            state.ids = documents
                .iter()
                .filter_map(|doc| doc.get_object_id(ID_KEY).ok())
                .collect();
            state.documents = documents;
        }
        collection
    }

    /// Number of find/insert calls served so far.
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, expected)| {
        let actual = doc.get(key);
        match expected {
            Bson::Document(op) if op.len() == 1 && op.contains_key("$in") => match op.get("$in") {
                Some(Bson::Array(candidates)) => actual.is_some_and(|v| candidates.contains(v)),
                _ => false,
            },
            _ => actual == Some(expected),
        }
    })
}

impl DocumentCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_one(&self, filter: Document) -> Result<Option<Document>, StoreError> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .lock()
            .documents
            .iter()
            .find(|doc| matches(doc, &filter))
            .cloned())
    }

    async fn insert_one(&self, mut doc: Document) -> Result<Identity, StoreError> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        let oid = match doc.get_object_id(ID_KEY) {
            Ok(oid) => oid,
            Err(_) => {
                let oid = ObjectId::new();
                doc.insert(ID_KEY, oid);
                oid
            }
        };

        let mut state = self.lock();
        if !state.ids.insert(oid) {
            return Err(StoreError::DuplicateIdentity {
                collection: self.name.clone(),
                identity: oid.to_hex(),
            });
        }
        state.documents.push(doc);
        Ok(Identity::from(oid))
    }
}
