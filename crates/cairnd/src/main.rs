//! cairnd — the Cairn coordinator daemon.
//!
//! Runs the whole core in one process: record store, fact base with
//! its timers, coordinator façade, reactor, and the local agent's
//! heartbeat loop. The agent-side launcher attaches its executor
//! through the dispatch registry; until one does, start dispatches
//! report `ExecutorNotRunning`.
//!
//! # Usage
//!
//! ```text
//! cairnd standalone --data-dir /var/lib/cairn
//! cairnd standalone --config /etc/cairn/cairn.toml --hostname worker-1
//! cairnd check-rules my-rules.dl
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use cairn_agent::{Agent, AgentConfig};
use cairn_bus::ChangeBus;
use cairn_coordinator::Coordinator;
use cairn_core::CairnConfig;
use cairn_dispatch::{Dispatcher, ExecutorRegistry};
use cairn_factstore::FactStore;
use cairn_reactor::Reactor;
use cairn_store::RecordStore;

#[derive(Parser)]
#[command(name = "cairnd", about = "Cairn cluster coordinator daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run coordinator, fact store, reactor, and local agent in one process.
    Standalone {
        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/cairn")]
        data_dir: PathBuf,

        /// Path to cairn.toml (defaults apply if absent).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Hostname to register the local agent under (detected if omitted).
        #[arg(long)]
        hostname: Option<String>,
    },

    /// Parse and safety-check a rule file, then exit.
    CheckRules {
        /// Rule file to validate.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cairnd=debug,cairn=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Standalone {
            data_dir,
            config,
            hostname,
        } => run_standalone(data_dir, config, hostname).await,
        Command::CheckRules { file } => check_rules(&file),
    }
}

async fn run_standalone(
    data_dir: PathBuf,
    config_path: Option<PathBuf>,
    hostname: Option<String>,
) -> anyhow::Result<()> {
    info!("cairn daemon starting in standalone mode");

    let config = match &config_path {
        Some(path) => CairnConfig::from_file(path)?,
        None => CairnConfig::default(),
    };
    info!(
        strategy = ?config.scheduler_strategy,
        tick_s = config.time_tick_interval_s,
        reconcile_s = config.reconcile_interval_s,
        "configuration loaded"
    );

    // ── Initialize subsystems ──────────────────────────────────

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("cairn.redb");
    let store = RecordStore::open(&db_path)?;
    info!(path = ?db_path, "record store opened");

    let bus = ChangeBus::new();

    // Shipped rule problems abort here, before anything is spawned.
    let facts = FactStore::bootstrap(store.clone(), bus.clone(), config.clone()).await?;
    info!("fact store bootstrapped");

    let registry = ExecutorRegistry::new();
    let dispatcher = Dispatcher::new(registry);

    let coordinator = Coordinator::new(
        store,
        bus.clone(),
        facts.clone(),
        dispatcher,
        config.scheduler_strategy,
    );
    info!("coordinator initialized");

    let mut reactor =
        Reactor::new(coordinator.clone(), bus.clone()).with_debounce_window(config.reactor_debounce());

    // Local agent: announce this host and start heartbeating. The
    // launcher attaches its executor via the dispatch registry.
    let mut agent_config = AgentConfig::new(
        &hostname.unwrap_or_else(cairn_agent::detect_hostname),
    );
    agent_config.heartbeat_interval = Duration::from_secs(config.heartbeat_interval_s);
    let mut agent = Agent::new(agent_config, coordinator.clone());
    let node_id = agent.announce().await?;
    coordinator
        .dispatcher()
        .registry()
        .register_agent(&node_id)
        .await;

    // ── Background tasks ───────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let tick_handle = tokio::spawn({
        let facts = facts.clone();
        let shutdown = shutdown_rx.clone();
        async move { facts.run_time_tick(shutdown).await }
    });
    let reconcile_handle = tokio::spawn({
        let facts = facts.clone();
        let shutdown = shutdown_rx.clone();
        async move { facts.run_reconciler(shutdown).await }
    });
    let listener_handle = tokio::spawn({
        let facts = facts.clone();
        let shutdown = shutdown_rx.clone();
        async move { facts.run_change_listener(shutdown).await }
    });
    let reactor_handle = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move { reactor.run(shutdown).await }
    });
    let heartbeat_handle = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move { agent.run_heartbeat(shutdown).await }
    });

    info!(%node_id, "cairn daemon running; ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    // Timers first, then the subscription loops; the store handle
    // drops last when this function returns.
    let _ = tick_handle.await;
    let _ = reconcile_handle.await;
    let _ = heartbeat_handle.await;
    let _ = listener_handle.await;
    let _ = reactor_handle.await;

    info!("cairn daemon stopped");
    Ok(())
}

fn check_rules(file: &PathBuf) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)?;
    match cairn_datalog::parse(&text) {
        Ok(program) => {
            println!(
                "{}: ok ({} facts, {} rules)",
                file.display(),
                program.facts.len(),
                program.rules.len()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {e}", file.display());
            std::process::exit(1);
        }
    }
}
