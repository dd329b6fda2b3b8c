use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mongodb::bson::Bson;

use atlas_models::db_mongo::models::{Customer, Product};
use atlas_models::db_mongo::queries::{find_by_identity, find_sample, insert_copy};
use atlas_models::mapper::{encode, parse_override};
use atlas_models::{
    EnvSettings, Identity, IdentityField, MongoModel, StoreConfig, StoreContext, ValidationError, logging,
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Record type to map documents onto. Inferred from the collection name when omitted.
    #[clap(long, value_enum)]
    model: Option<ModelKind>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the record stored under an identity.
    Lookup { collection: String, identity: String },
    /// Copy a record, apply field=value overrides, and insert it as a new document.
    InsertCopy {
        collection: String,
        identity: String,
        overrides: Vec<String>,
    },
    /// Report versions and decode one sample document.
    Verify {
        /// Defaults to MONGODB_COLLECTION_NAME.
        collection: Option<String>,
    },
}

impl Command {
    /// Check arguments that need no store round trip, so bad input fails
    /// before any connection is attempted.
    fn validate(&self) -> Result<Vec<(String, String)>, ValidationError> {
        match self {
            Command::Lookup { identity, .. } => {
                Identity::parse(identity)?;
                Ok(Vec::new())
            }
            Command::InsertCopy {
                identity, overrides, ..
            } => {
                Identity::parse(identity)?;
                overrides.iter().map(|arg| parse_override(arg)).collect()
            }
            Command::Verify { .. } => Ok(Vec::new()),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ModelKind {
    Customer,
    Product,
}

impl ModelKind {
    fn resolve(explicit: Option<ModelKind>, collection: &str) -> Self {
        match explicit {
            Some(kind) => kind,
            None if collection == Product::COLLECTION => ModelKind::Product,
            None => ModelKind::Customer,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let overrides = args.command.validate().context("Invalid argument")?;
    let settings = EnvSettings::load();
    logging::init_logging()?;
    settings.log_source();

    let config = StoreConfig::from_settings(&settings).context("Failed to resolve MongoDB settings")?;
    tracing::info!(database = %config.database, uri = %config.uri, "resolved store configuration");
    let ctx = StoreContext::connect(config)
        .await
        .context("Failed to connect to MongoDB")?;

    match args.command {
        Command::Lookup { collection, identity } => match ModelKind::resolve(args.model, &collection) {
            ModelKind::Customer => lookup::<Customer>(&ctx, &collection, &identity).await,
            ModelKind::Product => lookup::<Product>(&ctx, &collection, &identity).await,
        },
        Command::InsertCopy {
            collection, identity, ..
        } => match ModelKind::resolve(args.model, &collection) {
            ModelKind::Customer => copy::<Customer>(&ctx, &collection, &identity, &overrides).await,
            ModelKind::Product => copy::<Product>(&ctx, &collection, &identity, &overrides).await,
        },
        Command::Verify { collection } => {
            let collection = collection.unwrap_or_else(|| ctx.config().collection.clone());
            match ModelKind::resolve(args.model, &collection) {
                ModelKind::Customer => verify::<Customer>(&ctx, &collection).await,
                ModelKind::Product => verify::<Product>(&ctx, &collection).await,
            }
        }
    }
}

async fn lookup<M: MongoModel>(ctx: &StoreContext, collection: &str, identity: &str) -> Result<()> {
    let record: M = find_by_identity(&ctx.collection(collection), identity)
        .await
        .with_context(|| format!("Lookup of {} in '{}' failed", identity, collection))?;
    print_record(&record)
}

async fn copy<M: MongoModel>(
    ctx: &StoreContext,
    collection: &str,
    identity: &str,
    overrides: &[(String, String)],
) -> Result<()> {
    let record: M = insert_copy(&ctx.collection(collection), identity, overrides)
        .await
        .with_context(|| format!("Copy of {} in '{}' failed", identity, collection))?;
    println!("inserted {}", record.id());
    print_record(&record)
}

async fn verify<M: MongoModel>(ctx: &StoreContext, collection: &str) -> Result<()> {
    let server_version = ctx.server_version().await.context("Failed to read server version")?;
    println!("{} version: {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    println!("MongoDB server version: {}", server_version);

    let handle = ctx.collection(collection);
    println!("collection: {}.{}", handle.database_name(), collection);
    match find_sample::<M, _>(&handle)
        .await
        .with_context(|| format!("Sample document in '{}' did not validate", collection))?
    {
        Some(record) => print_record(&record),
        None => {
            println!("collection '{}' is empty", collection);
            Ok(())
        }
    }
}

fn print_record<M: MongoModel>(record: &M) -> Result<()> {
    let doc = encode(record, IdentityField::Include)?;
    let json = Bson::Document(doc).into_relaxed_extjson();
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ELMER_ID: &str = "5ca4bbcea2dd94ee58162a6a";

    fn command(argv: &[&str]) -> Command {
        let mut full = vec!["atlas-models"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).unwrap().command
    }

    #[test]
    fn test_malformed_identity_rejected_before_connecting() {
        let err = command(&["lookup", "customers", "not-an-id"]).validate().unwrap_err();
        assert_eq!(err.field, "_id");

        let err = command(&["insert-copy", "customers", "5CA4BBCEA2DD94EE58162A6A"])
            .validate()
            .unwrap_err();
        assert_eq!(err.field, "_id");
    }

    #[test]
    fn test_overrides_parsed_before_connecting() {
        let overrides = command(&["insert-copy", "customers", ELMER_ID, "username=efudd", "active=false"])
            .validate()
            .unwrap();
        assert_eq!(
            overrides,
            vec![
                ("username".to_string(), "efudd".to_string()),
                ("active".to_string(), "false".to_string()),
            ]
        );

        assert!(command(&["insert-copy", "customers", ELMER_ID, "username"]).validate().is_err());
    }

    #[test]
    fn test_verify_needs_no_arguments_checked() {
        assert!(command(&["verify"]).validate().unwrap().is_empty());
        assert!(command(&["lookup", "customers", ELMER_ID]).validate().is_ok());
    }

    #[test]
    fn test_model_inferred_from_collection() {
        assert_eq!(ModelKind::resolve(None, "products"), ModelKind::Product);
        assert_eq!(ModelKind::resolve(None, "customers"), ModelKind::Customer);
        assert_eq!(ModelKind::resolve(Some(ModelKind::Customer), "products"), ModelKind::Customer);
    }
}
