//! Typed document mapping and identity lookup over MongoDB Atlas.

pub mod config;
pub mod db_mongo;
pub mod error;
pub mod logging;
pub mod mapper;

pub use config::{EnvSettings, MapSettings, Settings, StoreConfig};
pub use db_mongo::{CollectionHandle, DocumentCollection, MemoryCollection, StoreContext};
pub use error::{StoreError, ValidationError, ValidationErrors};
pub use mapper::{Identity, IdentityField, MongoModel};
