//! Typed records over schemaless BSON documents.
//!
//! Every record type carries a static [`Schema`] that `decode` interprets
//! before serde builds the typed value, so a record that exists has always
//! passed validation.

pub mod identity;
pub mod schema;

use mongodb::bson::{self, Document};
use serde::{Serialize, de::DeserializeOwned};

pub use identity::Identity;
pub use schema::{FieldKind, FieldSpec, Schema};

use crate::error::{ValidationError, ValidationErrors};

/// Reserved wire key holding the record identity.
pub const ID_KEY: &str = "_id";

/// A record type stored in its own collection and identified by `_id`.
pub trait MongoModel: Serialize + DeserializeOwned + Clone + Send + Sync {
    const SCHEMA: &'static Schema;
    /// Collection this record type lives in by default.
    const COLLECTION: &'static str;

    fn id(&self) -> Identity;
    fn set_id(&mut self, id: Identity);
}

/// Whether `encode` writes the `_id` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    Include,
    /// Leave `_id` out so the store assigns one on insert.
    Omit,
}

/// Validate a raw document and build the typed record.
pub fn decode<M: MongoModel>(raw: &Document) -> Result<M, ValidationErrors> {
    let normalized = M::SCHEMA.validate(raw)?;
    bson::from_document(normalized)
        .map_err(|e| ValidationError::new(M::SCHEMA.name, e.to_string()).into())
}

/// Serialize a record back to its wire document.
pub fn encode<M: MongoModel>(record: &M, identity: IdentityField) -> Result<Document, ValidationError> {
    let mut doc = bson::to_document(record)
        .map_err(|e| ValidationError::new(M::SCHEMA.name, e.to_string()))?;
    if identity == IdentityField::Omit {
        doc.remove(ID_KEY);
    }
    Ok(doc)
}

/// Deep copy of `record` under a freshly generated identity.
pub fn duplicate_with_new_identity<M: MongoModel>(record: &M) -> M {
    let mut copy = record.clone();
    let mut fresh = Identity::generate();
    while fresh == record.id() {
        fresh = Identity::generate();
    }
    copy.set_id(fresh);
    copy
}

/// Apply `field=value` text overrides to a record and re-validate the result.
pub fn apply_overrides<M: MongoModel>(record: &M, overrides: &[(String, String)]) -> Result<M, ValidationErrors> {
    let mut doc = encode(record, IdentityField::Include)?;
    let mut errors = Vec::new();
    for (field, value) in overrides {
        match M::SCHEMA.coerce(field, value) {
            Ok(bson_value) => {
                doc.insert(field.clone(), bson_value);
            }
            Err(e) => errors.push(e),
        }
    }
    if !errors.is_empty() {
        return Err(ValidationErrors::new(errors));
    }
    decode(&doc)
}

/// Split a `field=value` argument.
pub fn parse_override(arg: &str) -> Result<(String, String), ValidationError> {
    match arg.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => {
            Ok((field.trim().to_string(), value.to_string()))
        }
        _ => Err(ValidationError::new(arg, "expected field=value")),
    }
}
