use cachet::ports::StorageFactory;
use cachet::{Cache, TtlSecs, TypedKey};
use clap::{Parser, Subcommand};
use serde_json::Value;
use shared::config::Settings;
use storage_engine::StoreFactory;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Talks to the cache backend configured through `CACHET_*` variables.
#[derive(Debug, Parser)]
#[command(name = "cachet", version)]
struct Cli {
    /// Derive storage keys from this type tag instead of using keys as given.
    #[arg(long, global = true)]
    scope: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the stored payload of a key.
    Get { key: String },
    /// Store a value. Input that is not JSON is stored as a JSON string.
    Set {
        key: String,
        value: String,
        /// Expiration in seconds; the backend default when omitted.
        #[arg(long)]
        ttl: Option<u64>,
        /// Fail if a live value already exists.
        #[arg(long)]
        if_absent: bool,
    },
    /// Remove one or more keys.
    Delete {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// List live keys.
    Keys {
        #[arg(long)]
        prefix: Option<String>,
    },
}

impl Cli {
    fn storage_key(&self, key: &str) -> String {
        match &self.scope {
            Some(tag) => TypedKey::new(tag, key).storage_key(),
            None => key.to_string(),
        }
    }
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match dotenvy::dotenv() {
        Ok(_) => info!("Loaded environment variables from .env file"),
        Err(_) => info!("No .env file found, using system environment variables"),
    }

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let cache = Cache::new(StoreFactory.create_from_settings(&settings)?);

    match &cli.command {
        Command::Get { key } => match cache.read_raw(&cli.storage_key(key)).await? {
            Some(payload) => println!("{payload}"),
            None => {
                eprintln!("{key}: not found");
                std::process::exit(1);
            }
        },
        Command::Set {
            key,
            value,
            ttl,
            if_absent,
        } => {
            let storage_key = cli.storage_key(key);
            let value = parse_value(value);
            let ttl = ttl.map(TtlSecs);
            let result = if *if_absent {
                cache.write_if_absent(&storage_key, &value, ttl).await?
            } else {
                cache.write(&storage_key, &value, ttl).await?
            };
            if !result.is_ok() {
                eprintln!("{key}: write not applied ({:?})", result.reason);
                std::process::exit(2);
            }
        }
        Command::Delete { keys } => {
            let storage_keys: Vec<String> = keys.iter().map(|k| cli.storage_key(k)).collect();
            let result = cache.delete_many(storage_keys).await?;
            if !result.is_ok() {
                eprintln!("delete not applied ({:?})", result.reason);
                std::process::exit(2);
            }
        }
        Command::Keys { prefix } => {
            for key in cache.list_keys(prefix.as_deref()).await? {
                println!("{key}");
            }
        }
    }

    Ok(())
}
