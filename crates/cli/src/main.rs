//! `pipeline-orchestrator` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`     : start the API server.
//! - `migrate`   : run pending database migrations.
//! - `validate`  : validate a workflow JSON file.
//! - `templates` : print the built-in templates.
//! - `node-types`: print the node type catalog.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use db::pool::PoolSettings;
use db::{ExecutionStore, MemoryStore, PgStore, WorkflowStore};
use nodes::NodeTypeRegistry;
use orchestrator::{
    CoordinatorConfig, ExecutionCoordinator, HttpEngine, NewWorkflow, TemplateCatalog,
    WorkflowRepository,
};

#[derive(Parser)]
#[command(
    name = "pipeline-orchestrator",
    about = "Content pipeline workflow orchestrator",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve(ServeArgs),
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: std::path::PathBuf,
    },
    /// List the built-in workflow templates.
    Templates,
    /// List the registered node types.
    NodeTypes,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind: String,
    /// Base URL of the Execution Engine.
    #[arg(long, env = "ENGINE_URL", default_value = "http://localhost:8001")]
    engine_url: String,
    #[arg(long, env = "ENGINE_TIMEOUT_SECS", default_value_t = 30)]
    engine_timeout_secs: u64,
    #[arg(long, env = "BATCH_PACING_MS", default_value_t = 250)]
    batch_pacing_ms: u64,
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 2000)]
    poll_interval_ms: u64,
    /// Postgres URL; workflows and executions are kept in memory when unset.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,
}

impl ServeArgs {
    fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            engine_timeout: Duration::from_secs(self.engine_timeout_secs),
            batch_pacing: Duration::from_millis(self.batch_pacing_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Migrate { database_url } => {
            info!("Running migrations");
            let pool = db::pool::create_pool(&database_url, &PoolSettings::with_max_connections(2))
                .await
                .context("failed to connect to database")?;
            db::pool::run_migrations(&pool)
                .await
                .context("migration failed")?;
            info!("Migrations applied successfully");
            Ok(())
        }
        Command::Validate { path } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read file {}", path.display()))?;
            let workflow: NewWorkflow =
                serde_json::from_str(&content).context("invalid workflow JSON")?;

            let registry = Arc::new(NodeTypeRegistry::builtin());
            let repository = WorkflowRepository::new(Arc::new(MemoryStore::new()), registry);
            match repository.validate(&workflow) {
                Ok(order) => {
                    println!("✅ Workflow is valid. Execution order: {order:?}");
                    Ok(())
                }
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Templates => {
            let templates = TemplateCatalog::builtin().list_templates();
            println!("{}", serde_json::to_string_pretty(&templates)?);
            Ok(())
        }
        Command::NodeTypes => {
            let registry = NodeTypeRegistry::builtin();
            println!("{}", serde_json::to_string_pretty(registry.list_node_types())?);
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let (workflows, executions): (Arc<dyn WorkflowStore>, Arc<dyn ExecutionStore>) =
        match &args.database_url {
            Some(url) => {
                let settings = PoolSettings::with_max_connections(args.max_connections);
                let pool = db::pool::create_pool(url, &settings)
                    .await
                    .context("failed to connect to database")?;
                db::pool::run_migrations(&pool)
                    .await
                    .context("migration failed")?;
                let store = Arc::new(PgStore::new(pool));
                (store.clone() as Arc<dyn WorkflowStore>, store as Arc<dyn ExecutionStore>)
            }
            None => {
                info!("DATABASE_URL not set; using the in-memory store");
                let store = Arc::new(MemoryStore::new());
                (store.clone() as Arc<dyn WorkflowStore>, store as Arc<dyn ExecutionStore>)
            }
        };

    let repository = WorkflowRepository::new(workflows, Arc::new(NodeTypeRegistry::builtin()));
    let engine = Arc::new(HttpEngine::new(&args.engine_url));
    info!(engine = %engine.base_url(), "Execution Engine client ready");

    let coordinator = Arc::new(ExecutionCoordinator::new(
        repository.clone(),
        executions,
        engine,
        args.coordinator_config(),
    ));

    info!("Starting API server on {}", args.bind);
    api::serve(&args.bind, api::AppState::new(repository, coordinator))
        .await
        .context("API server failed")
}
