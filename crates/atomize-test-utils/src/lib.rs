//! Shared test utilities for atomize integration tests.
//!
//! Provides a PostgreSQL instance shared across tests (each test gets its
//! own database within the instance) plus scripted generation transports
//! for driving decomposition sessions without a real LLM endpoint.
//!
//! Two database modes:
//! - **`ATOMIZE_TEST_PG_URL`** set (nextest setup script): use the external
//!   container directly. No testcontainers overhead per process.
//! - **No env var** (`cargo test`): spin up a container via testcontainers,
//!   shared per binary through a `OnceCell`.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use testcontainers::ContainerAsync;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

use atomize_core::generator::{FragmentStream, Generator, GeneratorError};
use atomize_db::pool;

// ---------------------------------------------------------------------------
// Shared PostgreSQL
// ---------------------------------------------------------------------------

/// Shared container state: base URL and optional container handle (kept alive).
struct SharedPg {
    base_url: String,
    /// Held to keep the container alive. `None` when using an external URL.
    _container: Option<ContainerAsync<Postgres>>,
}

/// Lazily-initialized shared PostgreSQL.
static SHARED_PG: OnceCell<SharedPg> = OnceCell::const_new();

async fn init_shared_pg() -> SharedPg {
    // If a setup script already started a container, use that directly.
    if let Ok(url) = std::env::var("ATOMIZE_TEST_PG_URL") {
        return SharedPg {
            base_url: url,
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("18")
        .start()
        .await
        .expect("failed to start PostgreSQL container");

    let host = container.get_host().await.expect("failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("failed to get mapped port");

    let base_url = format!("postgresql://postgres:postgres@{host}:{port}");

    SharedPg {
        base_url,
        _container: Some(container),
    }
}

/// Base URL for the shared PostgreSQL.
///
/// Lazily starts a container on first call (unless `ATOMIZE_TEST_PG_URL` is
/// set). The URL points at the server root (no database name appended).
pub async fn pg_url() -> &'static str {
    let shared = SHARED_PG.get_or_init(init_shared_pg).await;
    &shared.base_url
}

/// Create a temporary database with migrations applied.
///
/// Returns `(pool, db_name)`. The pool connects to a uniquely-named
/// database within the shared instance. Call [`drop_test_db`] with the
/// returned `db_name` when the test is done.
pub async fn create_test_db() -> (PgPool, String) {
    let base_url = pg_url().await;

    // Connect to the default "postgres" database to issue CREATE DATABASE.
    let maint_url = format!("{base_url}/postgres");
    let maint_pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&maint_url)
        .await
        .expect("failed to connect to maintenance database in container");

    let db_name = format!("atomize_test_{:016x}", rand::random::<u64>());
    let stmt = format!("CREATE DATABASE {db_name}");
    maint_pool
        .execute(stmt.as_str())
        .await
        .unwrap_or_else(|e| panic!("failed to create temp database {db_name}: {e}"));
    maint_pool.close().await;

    // Connect to the new database and run migrations.
    let temp_url = format!("{base_url}/{db_name}");
    let temp_pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&temp_url)
        .await
        .unwrap_or_else(|e| panic!("failed to connect to temp database {db_name}: {e}"));

    pool::run_migrations(&temp_pool)
        .await
        .expect("migrations should succeed");

    (temp_pool, db_name)
}

/// Drop a temporary database.
///
/// Terminates existing connections and drops the database. Safe to call
/// even if the database was already dropped.
pub async fn drop_test_db(db_name: &str) {
    let base_url = pg_url().await;
    let maint_url = format!("{base_url}/postgres");

    let maint_pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&maint_url)
        .await
        .expect("failed to connect to maintenance database for cleanup");

    // Terminate existing connections first.
    let terminate = format!(
        "SELECT pg_terminate_backend(pid) \
         FROM pg_stat_activity \
         WHERE datname = '{db_name}' AND pid <> pg_backend_pid()"
    );
    let _ = maint_pool.execute(terminate.as_str()).await;

    let stmt = format!("DROP DATABASE IF EXISTS {db_name}");
    let _ = maint_pool.execute(stmt.as_str()).await;
    maint_pool.close().await;
}

// ---------------------------------------------------------------------------
// Scripted generation transports
// ---------------------------------------------------------------------------

enum ScriptItem {
    Text(String),
    Fail(String),
}

/// Generation transport that replays a fixed fragment script.
///
/// Fragments are yielded exactly as given, so tests control where the
/// upstream chunk boundaries fall. An optional trailing failure surfaces
/// as an `Err` item on the stream, mimicking a dropped upstream connection.
pub struct ScriptedGenerator {
    script: Vec<ScriptItem>,
}

impl ScriptedGenerator {
    /// Replay the given fragments, then end the stream normally.
    pub fn from_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let script = fragments
            .into_iter()
            .map(|f| ScriptItem::Text(f.into()))
            .collect();
        Self { script }
    }

    /// Replay the given fragments, then fail with `message`.
    pub fn failing_after<I, S>(fragments: I, message: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut script: Vec<ScriptItem> = fragments
            .into_iter()
            .map(|f| ScriptItem::Text(f.into()))
            .collect();
        script.push(ScriptItem::Fail(message.to_owned()));
        Self { script }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn stream(&self, _prompt: &str) -> Result<FragmentStream, GeneratorError> {
        let items: Vec<Result<String, GeneratorError>> = self
            .script
            .iter()
            .map(|item| match item {
                ScriptItem::Text(text) => Ok(text.clone()),
                ScriptItem::Fail(message) => Err(GeneratorError::Api {
                    status: 502,
                    message: message.clone(),
                }),
            })
            .collect();

        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// Generation transport whose stream connects but never yields a fragment.
/// Used to exercise the session deadline.
pub struct StalledGenerator;

#[async_trait]
impl Generator for StalledGenerator {
    async fn stream(&self, _prompt: &str) -> Result<FragmentStream, GeneratorError> {
        Ok(Box::pin(futures::stream::pending()))
    }
}
