//! `orchestratord` - single-user control plane for concurrent AI-agent
//! coding sessions. CLI entry point for `serve` and `migrate`.

use eyre::{Context, Result};
use tracing::{debug, info};

use std::sync::Arc;

use orchestrator::cli::{Cli, Command};
use orchestrator::config::Config;
use orchestrator::events::create_event_bus;
use orchestrator::llm::create_client;
use orchestrator::scheduler::{Scheduler, SchedulerConfig};
use orchestrator::workspace::WorkspaceManager;

fn setup_logging(cli_log_level: Option<&str>) {
    let level = cli_log_level.and_then(|s| s.parse::<tracing::Level>().ok()).unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = <Cli as clap::Parser>::parse();

    setup_logging(cli.log_level.as_deref());

    let config = Config::load(cli.config.as_ref()).context("failed to load configuration")?;
    debug!(command = ?cli.command, "main: dispatching command");

    match cli.command {
        Command::Migrate => cmd_migrate(&config).await,
        Command::Serve => cmd_serve(&config).await,
    }
}

/// Create/upgrade the sqlite schema by opening the store, then exit.
async fn cmd_migrate(config: &Config) -> Result<()> {
    if let Some(parent) = config.store.db_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create store directory")?;
    }
    let _store =
        store::Store::open(&config.store.db_path).await.context("failed to open/initialize the store")?;
    info!(path = %config.store.db_path.display(), "schema up to date");
    Ok(())
}

/// Boot the control plane: store, event bus, workspace manager, LLM
/// clients and the scheduler. Quest conversations and objective
/// submissions arrive over the transport layer this binary doesn't
/// implement; this command just keeps the admission loop alive.
async fn cmd_serve(config: &Config) -> Result<()> {
    if let Some(parent) = config.store.db_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create store directory")?;
    }
    std::fs::create_dir_all(&config.git.worktree_dir).context("failed to create worktree directory")?;

    let store = store::Store::open(&config.store.db_path).await.context("failed to open the store")?;
    info!(path = %config.store.db_path.display(), "store opened");

    let bus = create_event_bus();
    let workspace = Arc::new(WorkspaceManager::new(config.git.clone()));

    let fast = create_client(&config.llm, store::ModelTier::Fast).context("failed to create fast-tier LLM client")?;
    let capable =
        create_client(&config.llm, store::ModelTier::Capable).context("failed to create capable-tier LLM client")?;
    info!(provider = %config.llm.provider, "LLM clients initialized");

    let scheduler = Arc::new(Scheduler::new(
        store,
        bus,
        workspace,
        capable,
        fast,
        config.concurrency.clone(),
        SchedulerConfig::new(config.concurrency.max_sessions),
        config.llm.max_tokens,
    ));
    let admission_loop = tokio::spawn(Arc::clone(&scheduler).run());

    info!("orchestrator running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutting down");
    scheduler.shutdown();
    let _ = admission_loop.await;
    Ok(())
}
