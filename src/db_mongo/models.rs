use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::mapper::{FieldKind, FieldSpec, Identity, MongoModel, Schema};

pub static TIER_DETAILS_SCHEMA: Schema = Schema {
    name: "TierDetails",
    fields: &[
        FieldSpec::required("tier", FieldKind::String),
        FieldSpec::required("benefits", FieldKind::StringList),
        FieldSpec::required("active", FieldKind::Boolean),
        FieldSpec::required("id", FieldKind::String),
    ],
};

pub static CUSTOMER_SCHEMA: Schema = Schema {
    name: "Customer",
    fields: &[
        FieldSpec::required("_id", FieldKind::Identity),
        FieldSpec::required("username", FieldKind::String),
        FieldSpec::required("name", FieldKind::String),
        FieldSpec::required("address", FieldKind::String),
        FieldSpec::required("birthdate", FieldKind::Timestamp),
        FieldSpec::optional("email", FieldKind::Email),
        FieldSpec::required("accounts", FieldKind::IntegerList),
        FieldSpec::required("tier_and_details", FieldKind::RecordMap(&TIER_DETAILS_SCHEMA)),
    ],
};

pub static PRODUCT_SCHEMA: Schema = Schema {
    name: "Product",
    fields: &[
        FieldSpec::required("_id", FieldKind::Identity),
        FieldSpec::required("name", FieldKind::String),
        FieldSpec::required("price", FieldKind::Integer),
        FieldSpec::required("category", FieldKind::String),
        FieldSpec::required("image", FieldKind::String),
        FieldSpec::required("id_visible", FieldKind::Integer),
    ],
};

/// Membership tier embedded in a customer, keyed by tier name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierDetails {
    pub tier: String,
    pub benefits: Vec<String>,
    pub active: bool,
    pub id: String,
}

/// Customer in `sample_analytics.customers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(rename = "_id")]
    pub id: Identity,
    pub username: String,
    pub name: String,
    pub address: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub birthdate: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub accounts: Vec<i64>,
    pub tier_and_details: BTreeMap<String, TierDetails>,
}

impl MongoModel for Customer {
    const SCHEMA: &'static Schema = &CUSTOMER_SCHEMA;
    const COLLECTION: &'static str = "customers";

    fn id(&self) -> Identity {
        self.id
    }

    fn set_id(&mut self, id: Identity) {
        self.id = id;
    }
}

/// Product in `store.products`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: Identity,
    pub name: String,
    pub price: i64,
    pub category: String,
    pub image: String,
    pub id_visible: i64,
}

impl MongoModel for Product {
    const SCHEMA: &'static Schema = &PRODUCT_SCHEMA;
    const COLLECTION: &'static str = "products";

    fn id(&self) -> Identity {
        self.id
    }

    fn set_id(&mut self, id: Identity) {
        self.id = id;
    }
}
