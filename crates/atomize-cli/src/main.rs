mod config;
mod decompose_cmd;
mod serve_cmd;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use atomize_core::crypto::FieldCipher;
use atomize_core::decompose::Decomposer;
use atomize_core::generator::{GeneratorConfig, OpenAiGenerator};
use atomize_core::scrub::RegexScrubber;
use atomize_db::pool;

use config::AtomizeConfig;

#[derive(Parser)]
#[command(name = "atomize", about = "Goal decomposition backend: streamed, encrypted micro-wins")]
struct Cli {
    /// Database URL (overrides ATOMIZE_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an atomize config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/atomize")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Database management
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Run the HTTP server
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Run one decomposition session, printing each event as a JSON line
    Decompose {
        /// The goal to break down
        goal: String,
        /// User whose profile shapes the steps (omit for defaults)
        #[arg(long)]
        user: Option<i64>,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Create the database if absent and run migrations
    Init,
}

/// Execute the `atomize init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let encryption_key = config::generate_encryption_key();

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        security: config::SecuritySection {
            encryption_key: encryption_key.clone(),
        },
        generator: config::GeneratorSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!(
        "  security.encryption_key = {}...{}",
        &encryption_key[..8],
        &encryption_key[56..]
    );
    println!();
    println!("Next: run `atomize db init` to create and migrate the database.");
    println!("Set OPENAI_API_KEY before running `atomize serve` or `atomize decompose`.");

    Ok(())
}

/// Execute the `atomize db init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> Result<()> {
    let resolved = AtomizeConfig::resolve(cli_db_url)?;

    println!("Initializing atomize database...");

    // 1. Create the database if it does not exist.
    pool::ensure_database_exists(&resolved.db_config).await?;

    // 2. Connect to the target database.
    let db_pool = pool::create_pool(&resolved.db_config).await?;

    // 3. Run migrations.
    pool::run_migrations(&db_pool).await?;

    // 4. Print success with table counts.
    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    // 5. Clean shutdown.
    db_pool.close().await;

    println!("atomize db init complete.");
    Ok(())
}

/// Build the field cipher and the fully wired decomposition service.
///
/// Requires a generation API key: the commands that call this are exactly
/// the ones that talk to the generation API.
fn build_decomposer(
    resolved: &AtomizeConfig,
    db_pool: sqlx::PgPool,
) -> Result<(Arc<FieldCipher>, Arc<Decomposer>)> {
    let Some(api_key) = resolved.generator.api_key.clone() else {
        anyhow::bail!(
            "generation API key not found; set OPENAI_API_KEY or add api_key to the [generator] section of the config file"
        );
    };

    let cipher = Arc::new(FieldCipher::new(&resolved.encryption_key));
    let generator = OpenAiGenerator::new(GeneratorConfig {
        base_url: resolved.generator.base_url.clone(),
        model: resolved.generator.model.clone(),
        api_key,
    })?;
    let decomposer = Arc::new(Decomposer::new(
        db_pool,
        Arc::clone(&cipher),
        Arc::new(RegexScrubber::new()),
        Arc::new(generator),
        Duration::from_secs(resolved.generator.max_stream_secs),
    ));

    Ok((cipher, decomposer))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("ATOMIZE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("atomize=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::Db {
            command: DbCommands::Init,
        } => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Serve { bind, port } => {
            let resolved = AtomizeConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let (cipher, decomposer) = build_decomposer(&resolved, db_pool.clone())?;
            let state = serve_cmd::AppState::new(db_pool.clone(), cipher, decomposer);
            let result = serve_cmd::run_serve(state, &bind, port).await;
            db_pool.close().await;
            result?;
        }
        Commands::Decompose { goal, user } => {
            let resolved = AtomizeConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let (_cipher, decomposer) = build_decomposer(&resolved, db_pool.clone())?;
            let result = decompose_cmd::run_decompose(&decomposer, &goal, user).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod test_util {
    use std::sync::{Mutex, MutexGuard, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    /// Serialize tests that mutate process-wide environment variables.
    pub fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
