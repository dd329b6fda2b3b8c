use std::future::Future;
use std::time::Duration;

use mongodb::{Collection, bson::Document};

use super::with_timeout;
use crate::error::{StoreError, ValidationError};
use crate::mapper::{ID_KEY, Identity};

/// The narrow slice of a document collection the mapper needs.
pub trait DocumentCollection: Send + Sync {
    fn name(&self) -> &str;

    fn find_one(
        &self,
        filter: Document,
    ) -> impl Future<Output = Result<Option<Document>, StoreError>> + Send;

    /// Insert `doc`, returning the identity the store recorded for it.
    fn insert_one(&self, doc: Document) -> impl Future<Output = Result<Identity, StoreError>> + Send;
}

/// A (database, collection) pair on a live client. Cheap to clone.
#[derive(Clone)]
pub struct CollectionHandle {
    collection: Collection<Document>,
    timeout: Duration,
}

impl CollectionHandle {
    pub fn new(collection: Collection<Document>, timeout: Duration) -> Self {
        Self { collection, timeout }
    }

    pub fn database_name(&self) -> String {
        self.collection.namespace().db
    }
}

impl DocumentCollection for CollectionHandle {
    fn name(&self) -> &str {
        self.collection.name()
    }

    async fn find_one(&self, filter: Document) -> Result<Option<Document>, StoreError> {
        with_timeout(self.timeout, async {
            Ok::<_, StoreError>(self.collection.find_one(filter).await?)
        })
        .await
    }

    async fn insert_one(&self, doc: Document) -> Result<Identity, StoreError> {
        let requested = doc
            .get_object_id(ID_KEY)
            .map(|oid| oid.to_hex())
            .unwrap_or_else(|_| "<store-assigned>".to_string());

        let result = with_timeout(self.timeout, async {
            self.collection
                .insert_one(doc)
                .await
                .map_err(|e| StoreError::from_write(self.name(), requested, e))
        })
        .await?;

        let oid = result.inserted_id.as_object_id().ok_or_else(|| {
            ValidationError::new(ID_KEY, "store assigned a non-ObjectId identity")
        })?;
        Ok(Identity::from(oid))
    }
}
