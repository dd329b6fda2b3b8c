use std::fmt;
use std::str::FromStr;

use mongodb::bson::{Bson, oid::ObjectId};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Length of the canonical hex form of an identity.
pub const IDENTITY_HEX_LEN: usize = 24;

/// Document identity, stored under `_id` as a BSON ObjectId.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(ObjectId);

impl Identity {
    /// Generate a fresh, process-unique identity.
    pub fn generate() -> Self {
        Self(ObjectId::new())
    }

    /// Parse the canonical form: exactly 24 lowercase hex characters.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        if text.len() != IDENTITY_HEX_LEN {
            return Err(ValidationError::new(
                "_id",
                format!(
                    "expected {} hex characters, got {}",
                    IDENTITY_HEX_LEN,
                    text.len()
                ),
            ));
        }
        if !text.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(ValidationError::new(
                "_id",
                "identity must be lowercase hexadecimal",
            ));
        }
        ObjectId::parse_str(text)
            .map(Self)
            .map_err(|e| ValidationError::new("_id", e.to_string()))
    }

    pub fn object_id(&self) -> ObjectId {
        self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl From<ObjectId> for Identity {
    fn from(oid: ObjectId) -> Self {
        Self(oid)
    }
}

impl From<Identity> for Bson {
    fn from(identity: Identity) -> Self {
        Bson::ObjectId(identity.0)
    }
}

impl FromStr for Identity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}
