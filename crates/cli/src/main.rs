mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};
use tradegate_brokers_crypto::CryptoVenues;
use tradegate_core::*;
use tradegate_data::{MemoryAccountStore, MemoryCache, MemorySettingsStore, PostgresSettingsStore};
use tradegate_engine::{NormalizerContext, NormalizerPool, StatsAggregator};

use config::AppConfig;

#[derive(Parser)]
#[command(name = "tradegate")]
#[command(about = "Uniform trading surface over multiple venues: dispatch, cache, and normalize venue calls")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "tradegate.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Database URL for the settings store; settings stay in memory without one
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one dispatched operation and print its result envelope
    Exec {
        /// Tenant uuid (nil uuid for the shared namespace)
        #[arg(long, default_value = "00000000-0000-0000-0000-000000000000")]
        tenant: TenantId,

        /// Account stub
        #[arg(long)]
        stub: String,

        /// Normalizer method or venue method (e.g. "balances", "fetch_ticker")
        method: String,

        /// Parameters as JSON
        params: Option<String>,

        /// Skip the cache read for this call
        #[arg(long)]
        no_cache: bool,
    },

    /// List venue profiles and their stablecoins
    Venues,

    /// List configured accounts
    Accounts,

    /// Manage stored settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Print one value, or every value under the main key
    Get {
        #[arg(long, default_value = "00000000-0000-0000-0000-000000000000")]
        tenant: TenantId,
        mainkey: String,
        subkey: Option<String>,
    },
    /// Store a value (JSON, or plain text)
    Set {
        #[arg(long, default_value = "00000000-0000-0000-0000-000000000000")]
        tenant: TenantId,
        mainkey: String,
        subkey: String,
        value: String,
    },
    /// Delete one value, or every value under the main key
    Delete {
        #[arg(long, default_value = "00000000-0000-0000-0000-000000000000")]
        tenant: TenantId,
        mainkey: String,
        subkey: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    match cli.log_format {
        LogFormat::Text => fmt().with_env_filter(filter).with_target(false).init(),
        LogFormat::Json => fmt().json().with_env_filter(filter).with_target(false).init(),
    }

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        tracing::warn!(config = %cli.config.display(), "Config file not found, using defaults");
        AppConfig::default()
    };
    let settings = settings_store(cli.database_url.as_deref()).await?;

    match cli.command {
        Commands::Exec {
            tenant,
            stub,
            method,
            params,
            no_cache,
        } => {
            let params = match params {
                Some(text) => serde_json::from_str(&text).context("PARAMS must be valid JSON")?,
                None => Value::Null,
            };
            run_exec(config, settings, tenant, &stub, &method, params, no_cache).await?;
        }
        Commands::Venues => {
            let venues = CryptoVenues::new();
            println!("Venue profiles:");
            for id in venues.venues() {
                if let Some(profile) = venues.profile(&id) {
                    let simulated = if config.venues.contains_key(&id) { " (fixture)" } else { "" };
                    println!("  {:<10} stablecoins: {}{}", id, profile.stablecoins().join(", "), simulated);
                }
            }
        }
        Commands::Accounts => {
            if config.accounts.is_empty() {
                println!("No accounts configured");
            }
            for account in &config.accounts {
                println!(
                    "  {:<16} venue: {:<10} name: {:<10} tenant: {}{}",
                    account.stub,
                    account.venue,
                    account.shortname,
                    account.tenant,
                    if account.testnet { " (testnet)" } else { "" }
                );
            }
        }
        Commands::Settings { command } => run_settings(settings.as_ref(), command).await?,
    }

    Ok(())
}

async fn settings_store(database_url: Option<&str>) -> Result<Arc<dyn SettingsStore>> {
    let Some(url) = database_url else {
        return Ok(Arc::new(MemorySettingsStore::new()));
    };
    let pool = sqlx::PgPool::connect(url).await?;
    tradegate_data::db::run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
    tracing::info!("Using PostgreSQL settings store");
    Ok(Arc::new(PostgresSettingsStore::new(pool)))
}

async fn run_exec(
    config: AppConfig,
    settings: Arc<dyn SettingsStore>,
    tenant: TenantId,
    stub: &str,
    method: &str,
    params: Value,
    no_cache: bool,
) -> Result<()> {
    let connectors = config.connectors()?;
    let accounts = MemoryAccountStore::from_accounts(config.accounts)?;
    let stats = Arc::new(StatsAggregator::new());
    let pool = NormalizerPool::new(NormalizerContext {
        cache: Arc::new(MemoryCache::new()),
        stats: stats.clone(),
        settings,
        accounts: Arc::new(accounts),
        connectors: Arc::new(connectors),
        venues: Arc::new(CryptoVenues::new()),
        config: config.normalizer,
    });

    tracing::info!(%tenant, stub, method, "Executing");
    let outcome = pool.execute(tenant, stub, method, params, no_cache).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    for summary in stats.summaries() {
        tracing::debug!(
            name = %summary.name,
            calls = summary.calls,
            cached = summary.cached,
            errors = summary.errors,
            avg_ms = %summary.avg_ms(),
            "Call stats"
        );
    }

    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_settings(settings: &dyn SettingsStore, command: SettingsCommands) -> Result<()> {
    match command {
        SettingsCommands::Get {
            tenant,
            mainkey,
            subkey,
        } => match settings.get(tenant, &mainkey, subkey.as_deref()).await? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value.to_json())?),
            None => println!("null"),
        },
        SettingsCommands::Set {
            tenant,
            mainkey,
            subkey,
            value,
        } => {
            let changed = settings
                .set(tenant, &mainkey, &subkey, &SettingValue::decode(&value))
                .await?;
            println!("{}", if changed { "updated" } else { "unchanged" });
        }
        SettingsCommands::Delete {
            tenant,
            mainkey,
            subkey,
        } => {
            let removed = settings.delete(tenant, &mainkey, subkey.as_deref()).await?;
            println!("{}", if removed { "deleted" } else { "not found" });
        }
    }
    Ok(())
}
