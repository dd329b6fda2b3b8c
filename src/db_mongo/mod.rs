pub mod collection;
pub mod memory;
pub mod models;
pub mod queries;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use mongodb::bson::doc;
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};

use crate::config::{CONNECTION_TEMPLATE_KEY, PWD_KEY, Settings, StoreConfig, UID_KEY};
use crate::error::StoreError;

pub use collection::{CollectionHandle, DocumentCollection};
pub use memory::MemoryCollection;

pub const SCHEME_PREFIX: &str = "mongodb+srv://";

/// An assembled connection string. `Debug` and `Display` mask the password.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionUri {
    full: String,
    redacted: String,
}

impl ConnectionUri {
    /// The string handed to the driver. Never log this.
    pub fn expose(&self) -> &str {
        &self.full
    }

    pub fn redacted(&self) -> &str {
        &self.redacted
    }
}

impl fmt::Display for ConnectionUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted)
    }
}

impl fmt::Debug for ConnectionUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionUri").field(&self.redacted).finish()
    }
}

/// Build `mongodb+srv://{uid}:{pwd}@{template}` from settings.
pub fn connection_uri(settings: &impl Settings) -> Result<ConnectionUri, StoreError> {
    let template = settings.get(CONNECTION_TEMPLATE_KEY)?;
    let uid = settings.get(UID_KEY)?;
    let pwd = settings.get(PWD_KEY)?;

    Ok(ConnectionUri {
        full: format!("{}{}:{}@{}", SCHEME_PREFIX, uid, pwd, template),
        redacted: format!("{}{}:****@{}", SCHEME_PREFIX, uid, template),
    })
}

/// Pool and timeout knobs applied when opening a client.
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions {
    pub timeout: Duration,
    pub max_pool_size: u32,
}

impl From<&StoreConfig> for ConnectOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            timeout: config.timeout,
            max_pool_size: config.max_pool_size,
        }
    }
}

/// Open a pooled client and ping it. Every call yields an independent client.
pub async fn connect(uri: &ConnectionUri, options: ConnectOptions) -> Result<Client, StoreError> {
    let mut client_options = with_timeout(options.timeout, async {
        ClientOptions::parse(uri.expose()).await.map_err(|e| {
            if matches!(e.kind.as_ref(), ErrorKind::InvalidArgument { .. }) {
                StoreError::configuration(CONNECTION_TEMPLATE_KEY)
            } else {
                StoreError::from(e)
            }
        })
    })
    .await?;

    client_options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
    client_options.connect_timeout = Some(options.timeout);
    client_options.server_selection_timeout = Some(options.timeout);
    client_options.max_pool_size = Some(options.max_pool_size);

    let client = Client::with_options(client_options)?;

    // Ping to verify connection
    with_timeout(options.timeout, async {
        Ok::<_, StoreError>(client.database("admin").run_command(doc! { "ping": 1 }).await?)
    })
    .await?;

    tracing::info!("Successfully connected to MongoDB at {}", uri);
    Ok(client)
}

/// Bound one store round trip by `limit`.
///
/// Both our own expiry and the driver's server-selection timeout come back as
/// `ConnectionFailure::Timeout`, whichever fires first.
pub(crate) async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Err(err)) if err.is_server_selection() => {
            tracing::warn!("No MongoDB server available within {}s: {}", limit.as_secs(), err);
            Err(StoreError::timeout(limit.as_secs()))
        }
        Ok(result) => result,
        Err(_) => Err(StoreError::timeout(limit.as_secs())),
    }
}

/// Get database handle
pub fn get_database(client: &Client, db_name: &str) -> Database {
    client.database(db_name)
}

/// Reference a collection. Nothing is checked until the first round trip.
pub fn get_collection(client: &Client, db_name: &str, collection_name: &str, op_timeout: Duration) -> CollectionHandle {
    CollectionHandle::new(get_database(client, db_name).collection(collection_name), op_timeout)
}

/// Version string reported by the server's `buildInfo`.
pub async fn server_version(client: &Client, op_timeout: Duration) -> Result<String, StoreError> {
    let info = with_timeout(op_timeout, async {
        Ok::<_, StoreError>(client.database("admin").run_command(doc! { "buildInfo": 1 }).await?)
    })
    .await?;

    Ok(info.get_str("version").unwrap_or("unknown").to_string())
}

/// Caller-owned handle bundling a live client with the settings that produced it.
#[derive(Clone)]
pub struct StoreContext {
    client: Client,
    config: StoreConfig,
}

impl StoreContext {
    pub async fn connect(config: StoreConfig) -> Result<Self, StoreError> {
        let client = connect(&config.uri, ConnectOptions::from(&config)).await?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// A collection in the configured database.
    pub fn collection(&self, name: &str) -> CollectionHandle {
        get_collection(&self.client, &self.config.database, name, self.config.timeout)
    }

    /// The collection named by `MONGODB_COLLECTION_NAME`.
    pub fn default_collection(&self) -> CollectionHandle {
        self.collection(&self.config.collection)
    }

    pub async fn server_version(&self) -> Result<String, StoreError> {
        server_version(&self.client, self.config.timeout).await
    }
}
