//! Process entrypoint: wires storage, parsing, search, and the indexer
//! worker together for one workspace root, registers the process in the
//! daemon registry, and blocks running the indexing pipeline until stopped.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use sari_index::{size_limits_for, IndexerWorker, WorkerConfig};
use sari_model::config::CoreConfig;
use sari_model::DaemonRegistryEntry;
use sari_parsing::ParserRegistry;
use sari_registry::{acquire_leader, DaemonRegistry, LeaderRole};
use sari_search::{EngineRouter, EnginePreference};
use sari_storage::{store, DbWriter, WriterConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Runs the Sari indexing daemon for a single workspace root.
#[derive(Parser, Debug)]
#[command(name = "sari-daemon", version, about = "Workspace-local code intelligence daemon")]
struct Cli {
    /// Root directory of the workspace to index.
    #[arg(long, env = "WORKSPACE_ROOT")]
    workspace_root: PathBuf,

    /// Path to the SQLite database file. Defaults to `<workspace_root>/.sari/sari.db`.
    #[arg(long, env = "DB_PATH")]
    db_path: Option<PathBuf>,

    /// Name recorded alongside indexed rows; defaults to the workspace directory name.
    #[arg(long)]
    repo: Option<String>,

    /// Host this daemon is reachable at, recorded in the registry.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port this daemon is reachable at, recorded in the registry.
    #[arg(long, default_value_t = 0)]
    port: u16,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = CoreConfig::from_env()?;

    let workspace_root = cli.workspace_root.canonicalize().unwrap_or(cli.workspace_root.clone());
    let repo = cli
        .repo
        .unwrap_or_else(|| workspace_root.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "workspace".into()));
    let db_path = cli.db_path.unwrap_or_else(|| workspace_root.join(".sari").join("sari.db"));
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let leader_role = acquire_leader(config.indexer.mode, &db_path)?;
    let indexing_enabled = matches!(leader_role, LeaderRole::Leader(_));
    match &leader_role {
        LeaderRole::Leader(_) => tracing::info!(db_path = %db_path.display(), "acquired indexing leadership"),
        LeaderRole::Follower => tracing::info!("running as follower; another process owns indexing"),
        LeaderRole::Disabled => tracing::info!("indexing disabled by configuration"),
    }

    let write_conn = Arc::new(Mutex::new(store::open(&db_path)?));
    let read_conn = Arc::new(Mutex::new(store::open(&db_path)?));

    let engine_router = Arc::new(EngineRouter::new(
        db_path.parent().map(PathBuf::from).unwrap_or_else(std::env::temp_dir),
        EnginePreference::Auto,
    ));
    let writer = Arc::new(DbWriter::spawn(write_conn, Some(engine_router), WriterConfig::default()));
    let registry = Arc::new(ParserRegistry::new());

    let size_limits = size_limits_for(
        config.indexer.size_profile,
        config.indexer.max_parse_bytes,
        config.indexer.max_ast_bytes,
    );

    let worker_config = WorkerConfig {
        include: None,
        exclude: None,
        size_limits,
        decode_policy: config.indexer.utf8_decode_policy,
        sampling_enabled: config.indexer.sample_large_files,
        parse_timeout: std::time::Duration::from_secs(config.indexer.parse_timeout_seconds),
        parse_timeout_workers: config.indexer.parse_timeout_workers,
        dlq_poll_interval: std::time::Duration::from_secs(config.indexer.dlq_poll_seconds),
        scan_interval: std::time::Duration::from_secs(config.watch.watcher_monitor_seconds),
        startup_index: config.indexer.startup_index && indexing_enabled,
        coalesce_shards: config.watch.coalesce_shards,
        coalesce_max_keys: 10_000,
        watch_config: sari_watch::WatchConfig {
            debounce: std::time::Duration::from_millis(250),
            git_debounce: std::time::Duration::from_millis(config.watch.git_checkout_debounce_ms),
            monitor_interval: std::time::Duration::from_secs(config.watch.watcher_monitor_seconds),
        },
    };

    let worker = Arc::new(IndexerWorker::new(read_conn, writer, registry, worker_config));
    let root_id = worker.register_root(&workspace_root, &repo);
    tracing::info!(root_id, repo, root = %workspace_root.display(), "registered workspace root");

    let registry_store = sari_registry::default_registry_path();
    let registry_path = config
        .registry
        .registry_file
        .clone()
        .map(PathBuf::from)
        .unwrap_or(registry_store);
    let daemon_registry = DaemonRegistry::open(registry_path);
    let boot_id = uuid::Uuid::now_v7().to_string();
    daemon_registry.register_daemon(DaemonRegistryEntry {
        boot_id: boot_id.clone(),
        host: cli.host,
        port: cli.port,
        pid: std::process::id(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        http_host: None,
        http_port: None,
        last_seen_ts: 0,
        draining: false,
    })?;
    daemon_registry.set_workspace(&workspace_root.display().to_string(), &boot_id)?;

    let run_result = if indexing_enabled {
        worker.run_forever()
    } else {
        tracing::warn!("indexing is not enabled for this process; holding registration only");
        loop {
            std::thread::sleep(std::time::Duration::from_secs(config.watch.watcher_monitor_seconds.max(1)));
            if !daemon_registry.heartbeat(&boot_id).unwrap_or(false) {
                break Ok(());
            }
        }
    };

    let _ = daemon_registry.deregister_daemon(&boot_id);
    run_result?;
    Ok(())
}
