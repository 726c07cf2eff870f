use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fieldsync_cache::TransformCache;
use fieldsync_cli::config::FieldsyncConfig;
use fieldsync_cli::server;
use fieldsync_notion::{apply_mappings, NotionClient};
use fieldsync_protocol::{validate_pair, Envelope, FieldType};
use fieldsync_store::{JsonFilePersister, MappingStore};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "fieldsync",
    version,
    about = "Notion to website field mapping engine"
)]
struct Cli {
    /// Path to a JSON or TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API server.
    Serve {
        #[arg(long, default_value = "127.0.0.1:4141")]
        bind: String,
    },
    /// Check one source/target type pair against the compatibility table.
    Validate {
        #[arg(long, value_parser = parse_field_type)]
        source: FieldType,
        #[arg(long, value_parser = parse_field_type)]
        target: FieldType,
    },
    /// Print the Notion database schema as mappable fields.
    Schema {
        #[arg(long)]
        database: Option<String>,
    },
    /// Run the stored mappings against one page of the database.
    TestMapping {
        #[arg(long)]
        database: Option<String>,
    },
    /// Fetch every page of the database and apply the stored mappings
    /// to each.
    Export {
        #[arg(long)]
        database: Option<String>,
    },
    /// Print transformation cache statistics.
    CacheStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = FieldsyncConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { bind } => {
            let state = server::build_state(&config)?;
            server::serve(&bind, state).await
        }
        Command::Validate { source, target } => {
            let result = validate_pair(source, target);
            print_json(&Envelope::ok(result))
        }
        Command::Schema { database } => {
            let client = notion_client(&config)?;
            let database_id = database_id(database, &config)?;
            let fields = client.database_schema(&database_id).await?;
            print_json(&Envelope::ok(fields))
        }
        Command::TestMapping { database } => {
            let client = notion_client(&config)?;
            let database_id = database_id(database, &config)?;
            let store = MappingStore::open(Box::new(JsonFilePersister::new(&config.state_path)));
            let mappings = store.mappings().to_vec();
            anyhow::ensure!(!mappings.is_empty(), "No mappings to test");

            let batch = client.query_database(&database_id, 1, None).await?;
            let page = batch
                .results
                .first()
                .context("No test data available in the database")?;
            print_json(&Envelope::ok(apply_mappings(page, &mappings)))
        }
        Command::Export { database } => {
            let client = notion_client(&config)?;
            let database_id = database_id(database, &config)?;
            let store = MappingStore::open(Box::new(JsonFilePersister::new(&config.state_path)));
            let mappings = store.mappings().to_vec();
            anyhow::ensure!(!mappings.is_empty(), "No mappings to export with");

            let pages = client.list_all_pages(&database_id).await?;
            let runs: Vec<_> = pages
                .iter()
                .map(|page| apply_mappings(page, &mappings))
                .collect();
            print_json(&Envelope::ok(runs))
        }
        Command::CacheStats => {
            let cache: TransformCache<serde_json::Value> =
                TransformCache::new(config.cache_config());
            print_json(&Envelope::ok(cache.stats()))
        }
    }
}

fn notion_client(config: &FieldsyncConfig) -> Result<NotionClient> {
    let notion_config = config.notion_config().with_context(|| {
        format!("Notion token is not configured (set {})", fieldsync_cli::config::NOTION_TOKEN_ENV)
    })?;
    Ok(NotionClient::new(notion_config)?)
}

fn database_id(flag: Option<String>, config: &FieldsyncConfig) -> Result<String> {
    flag.or_else(|| config.database_id.clone())
        .context("No database id configured (pass --database or set database_id)")
}

fn parse_field_type(raw: &str) -> std::result::Result<FieldType, String> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| format!("unknown field type '{raw}'"))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
