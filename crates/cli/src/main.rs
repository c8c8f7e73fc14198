//! `chainflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    : start the API server.
//! - `migrate`  : run pending database migrations.
//! - `validate` : validate a workflow JSON file and print its execution order.

mod config;
mod logging;
mod validate;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use cache::{MemoryBackend, RedisBackend, WorkflowCache};
use db::{MemoryStore, PgStore, Store};
use nodes::LlmTransform;

use crate::config::{AppConfig, CacheKind, StorageBackend};
use crate::validate::Verdict;

#[derive(Parser)]
#[command(name = "chainflow", about = "LLM-backed text transformation workflows", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        /// Overrides `server.host:server.port`.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run pending database migrations.
    Migrate {
        /// Overrides `database.url`.
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = AppConfig::load().context("failed to load configuration")?;
    logging::init_logging(&config.logging);

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.address());
            serve(&config, &bind).await?;
        }
        Command::Migrate { database_url } => {
            let url = database_url.unwrap_or_else(|| config.database.url.clone());
            let pool = db::pool::create_pool(&url, 2).await?;
            db::pool::run_migrations(&pool).await?;
            info!("migrations applied");
        }
        Command::Validate { path } => {
            let file = validate::read(&path)?;
            let label = file.name.clone().unwrap_or_else(|| path.display().to_string());
            match validate::check(&file)? {
                Verdict::Valid(order) => {
                    println!("{label} is valid. Execution order: {}", order.join(" -> "));
                }
                Verdict::Invalid(errors) => {
                    eprintln!("{label} is invalid:");
                    for error in errors {
                        eprintln!("  - {error}");
                    }
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn serve(config: &AppConfig, bind: &str) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = match config.storage.backend {
        StorageBackend::Postgres => {
            let pool =
                db::pool::create_pool(&config.database.url, config.database.max_connections).await?;
            db::pool::run_migrations(&pool).await?;
            Arc::new(PgStore::new(pool))
        }
        StorageBackend::Memory => {
            warn!("using in-memory storage; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let transform = LlmTransform::from_config(config.llm.gemini())?;
    if matches!(transform, LlmTransform::Disabled) {
        warn!("no Gemini API key configured; every step will fail");
    }

    let cache = build_cache(config).await;
    let state = api::AppState::new(store, Arc::new(transform), cache);

    info!(%bind, "starting API server");
    api::serve(bind, state).await?;
    Ok(())
}

/// An unreachable redis leaves the cache disabled rather than blocking startup.
async fn build_cache(config: &AppConfig) -> WorkflowCache {
    let settings = &config.cache;
    match settings.backend {
        CacheKind::None => WorkflowCache::disabled(),
        CacheKind::Memory => WorkflowCache::new(
            Arc::new(MemoryBackend::new(settings.max_capacity, settings.ttl())),
            settings.ttl(),
        ),
        CacheKind::Redis => match RedisBackend::connect(&settings.redis_url).await {
            Ok(backend) => WorkflowCache::new(Arc::new(backend), settings.ttl()),
            Err(e) => {
                warn!(error = %e, "redis unavailable, workflow cache disabled");
                WorkflowCache::disabled()
            }
        },
    }
}
