use mongodb::bson::doc;

use super::collection::DocumentCollection;
use crate::error::StoreError;
use crate::mapper::{
    Identity, IdentityField, MongoModel, apply_overrides, decode, duplicate_with_new_identity, encode,
};

/// Fetch one record by its `_id` hex string.
///
/// Malformed text fails validation before any round trip. Documents whose
/// `_id` was stored as the hex string rather than an ObjectId match too.
pub async fn find_by_identity<M, C>(collection: &C, identity_text: &str) -> Result<M, StoreError>
where
    M: MongoModel,
    C: DocumentCollection,
{
    let identity = Identity::parse(identity_text)?;
    tracing::debug!(collection = collection.name(), %identity, "find by identity");

    let raw = collection
        .find_one(doc! { "_id": { "$in": [identity, identity.to_hex()] } })
        .await?
        .ok_or_else(|| StoreError::NotFound {
            collection: collection.name().to_string(),
            identity,
        })?;

    Ok(decode(&raw)?)
}

/// Fetch and decode any one document, if the collection has one.
pub async fn find_sample<M, C>(collection: &C) -> Result<Option<M>, StoreError>
where
    M: MongoModel,
    C: DocumentCollection,
{
    match collection.find_one(doc! {}).await? {
        Some(raw) => Ok(Some(decode(&raw)?)),
        None => Ok(None),
    }
}

/// Insert `record` as a new document. Its in-memory identity is not sent;
/// the returned identity is the one the store assigned.
pub async fn insert_new<M, C>(collection: &C, record: &M) -> Result<Identity, StoreError>
where
    M: MongoModel,
    C: DocumentCollection,
{
    let doc = encode(record, IdentityField::Omit)?;
    let inserted = collection.insert_one(doc).await?;
    tracing::info!(collection = collection.name(), identity = %inserted, "inserted new {}", M::SCHEMA.name);
    Ok(inserted)
}

/// Copy the record stored under `identity_text`, apply overrides, and insert it as new.
pub async fn insert_copy<M, C>(
    collection: &C,
    identity_text: &str,
    overrides: &[(String, String)],
) -> Result<M, StoreError>
where
    M: MongoModel,
    C: DocumentCollection,
{
    let original: M = find_by_identity(collection, identity_text).await?;
    let staged = duplicate_with_new_identity(&original);
    let mut copy = apply_overrides(&staged, overrides)?;
    let inserted = insert_new(collection, &copy).await?;
    copy.set_id(inserted);
    Ok(copy)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::db_mongo::memory::MemoryCollection;
    use crate::db_mongo::models::{Customer, Product};
    use mongodb::bson::{Document, oid::ObjectId};

    const ELMER_ID: &str = "67ba172377e77ea34bc1c118";

    fn elmer() -> Document {
        doc! {
            "_id": ObjectId::parse_str(ELMER_ID).unwrap(),
            "username": "efudd",
            "name": "Elmer Fudd",
            "address": "123 Toon Ln",
            "birthdate": "1940-01-01T00:00:00Z",
            "accounts": [1, 2],
            "tier_and_details": {
                "gold": { "tier": "gold", "benefits": ["x"], "active": true, "id": "t1" }
            },
        }
    }

    fn customers() -> MemoryCollection {
        MemoryCollection::with_documents("customers", vec![elmer()])
    }

    #[tokio::test]
    async fn test_find_by_identity() {
        let collection = customers();
        let customer: Customer = find_by_identity(&collection, ELMER_ID).await.unwrap();
        assert_eq!(customer.name, "Elmer Fudd");
        assert_eq!(customer.id.to_hex(), ELMER_ID);
    }

    #[tokio::test]
    async fn test_find_by_identity_matches_string_id() {
        let mut stored = elmer();
        stored.insert("_id", ELMER_ID);
        let collection = MemoryCollection::with_documents("customers", vec![stored]);

        let customer: Customer = find_by_identity(&collection, ELMER_ID).await.unwrap();
        assert_eq!(customer.id.to_hex(), ELMER_ID);
        assert_eq!(collection.round_trips(), 1);
    }

    #[tokio::test]
    async fn test_malformed_identity_skips_round_trip() {
        let collection = customers();
        for bad in ["67ba1723", "67BA172377E77EA34BC1C118", "not-an-object-id-at-all!"] {
            let err = find_by_identity::<Customer, _>(&collection, bad).await.unwrap_err();
            assert!(matches!(err, StoreError::Validation(_)), "{bad}: {err}");
        }
        assert_eq!(collection.round_trips(), 0);
    }

    #[tokio::test]
    async fn test_unknown_identity_is_not_found() {
        let collection = customers();
        let err = find_by_identity::<Customer, _>(&collection, "67ba1a6ede6fd6a19f1bb175")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert_eq!(collection.round_trips(), 1);
    }

    #[tokio::test]
    async fn test_invalid_stored_document_fails_validation() {
        let mut broken = elmer();
        broken.remove("username");
        let collection = MemoryCollection::with_documents("customers", vec![broken]);
        let err = find_by_identity::<Customer, _>(&collection, ELMER_ID).await.unwrap_err();
        match err {
            StoreError::Validation(errors) => assert_eq!(errors.first_field(), Some("username")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_find_sample() {
        let empty = MemoryCollection::new("products");
        assert!(find_sample::<Product, _>(&empty).await.unwrap().is_none());

        let collection = customers();
        let sample: Customer = find_sample(&collection).await.unwrap().unwrap();
        assert_eq!(sample.username, "efudd");
    }

    #[tokio::test]
    async fn test_insert_copy_applies_overrides() {
        let collection = customers();
        let overrides = vec![
            ("username".to_string(), "daffyduck".to_string()),
            ("email".to_string(), "daffy.duck@gmail.com".to_string()),
            ("name".to_string(), "Daffy Duck".to_string()),
        ];
        let copy: Customer = insert_copy(&collection, ELMER_ID, &overrides).await.unwrap();
        assert_ne!(copy.id.to_hex(), ELMER_ID);
        assert_eq!(copy.username, "daffyduck");
        assert_eq!(copy.accounts, vec![1, 2]);
        assert_eq!(collection.len(), 2);

        let stored: Customer = find_by_identity(&collection, &copy.id.to_hex()).await.unwrap();
        assert_eq!(stored, copy);
    }

    #[tokio::test]
    async fn test_insert_copy_rejects_bad_override() {
        let collection = customers();
        let overrides = vec![("email".to_string(), "not an email".to_string())];
        let err = insert_copy::<Customer, _>(&collection, ELMER_ID, &overrides)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(collection.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_with_identity_collides() {
        let collection = customers();
        let customer: Customer = find_by_identity(&collection, ELMER_ID).await.unwrap();
        let err = collection
            .insert_one(encode(&customer, IdentityField::Include).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateIdentity { .. }));
    }

    #[tokio::test]
    async fn test_many_duplicates_never_collide() {
        let collection = customers();
        let source: Customer = find_by_identity(&collection, ELMER_ID).await.unwrap();

        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let copy = duplicate_with_new_identity(&source);
            assert_ne!(copy.id, source.id);
            assert!(seen.insert(copy.id));

            let inserted = insert_new(&collection, &copy).await.unwrap();
            assert_ne!(inserted, source.id);
        }
        assert_eq!(collection.len(), 10_001);
    }
}
