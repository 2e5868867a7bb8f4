use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cq_core::{DatasetType, HookKind, HookMode, ProjectConfig, QueueMode, SearchMode};
use cq_db::{Backend, BackendConfig};
use cq_index::{AnalyzerRegistry, CancellationToken, Pipeline, PipelineConfig, Progress};
use cq_search::SearchConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cq-cli")]
#[command(about = "Searchable code documentation for a git project")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Set up `.code-query/` in the current project
  Init {
    #[arg(long, default_value = "core")]
    dataset: String,
    #[arg(long, default_value = ".")]
    source: String,
  },
  /// Search a dataset's documentation
  Search {
    query: String,
    #[arg(long, default_value = "core")]
    dataset: String,
    #[arg(long, default_value = "unified")]
    mode: String,
    #[arg(long, default_value = "10")]
    limit: u32,
    #[arg(long)]
    json: bool,
  },
  /// Discover, analyze, and persist documentation for a dataset's source tree
  Index {
    #[arg(long, default_value = "core")]
    dataset: String,
    #[arg(long, default_value = ".")]
    source: String,
    #[arg(long)]
    update_existing: bool,
  },
  /// Manage datasets (create/fork/sync/diff/delete/...)
  Dataset {
    #[command(subcommand)]
    command: DatasetCommands,
  },
  /// Install or run a git hook
  Hook {
    #[command(subcommand)]
    command: HookCommands,
  },
  /// Run the background indexing worker
  Worker {
    #[command(subcommand)]
    command: WorkerCommands,
  },
}

#[derive(Subcommand)]
enum DatasetCommands {
  Create {
    id: String,
    #[arg(long)]
    source: String,
    #[arg(long, default_value = "main")]
    dataset_type: String,
    #[arg(long)]
    parent: Option<String>,
    #[arg(long)]
    branch: Option<String>,
  },
  Get {
    id: String,
  },
  List {
    #[arg(long)]
    parent: Option<String>,
  },
  Fork {
    source: String,
    target: String,
  },
  Sync {
    source: String,
    target: String,
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    source_ref: String,
    #[arg(long)]
    target_ref: String,
  },
  Diff {
    left: String,
    right: String,
  },
  Delete {
    id: String,
    #[arg(long)]
    force: bool,
  },
  Stats {
    id: String,
  },
  CleanupOrphans {
    #[arg(long, default_value = ".")]
    repo: String,
    #[arg(long)]
    dry_run: bool,
  },
}

#[derive(Subcommand)]
enum HookCommands {
  /// Write the git hook script that invokes `cq-cli hook <kind>`
  Install {
    kind: String,
    #[arg(long, default_value = "core")]
    dataset: String,
    #[arg(long, default_value = "auto")]
    mode: String,
  },
  /// Runtime entry point invoked BY the installed hook script. Never fails:
  /// every internal error is logged and the process still exits 0.
  #[command(name = "pre-commit")]
  PreCommit {
    #[arg(long)]
    dataset: String,
    #[arg(long)]
    mode: String,
  },
  #[command(name = "post-merge")]
  PostMerge {
    #[arg(long)]
    dataset: String,
    #[arg(long)]
    mode: String,
  },
}

#[derive(Subcommand)]
enum WorkerCommands {
  Start {
    #[arg(long, default_value = "core")]
    dataset: String,
  },
}

fn project_root() -> Result<PathBuf> {
  let cwd = std::env::current_dir().context("reading current directory")?;
  Ok(cq_core::resolve_project_path(&cwd))
}

fn db_path(root: &Path) -> PathBuf {
  cq_core::config::config_dir(root).join("code_data.db")
}

fn open_backend(root: &Path) -> Result<Backend> {
  let path = db_path(root);
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  Backend::open(&path, BackendConfig::default()).context("opening storage backend")
}

fn parse_search_mode(raw: &str) -> Result<SearchMode> {
  match raw {
    "unified" => Ok(SearchMode::Unified),
    "metadata" => Ok(SearchMode::MetadataOnly),
    "content" => Ok(SearchMode::ContentOnly),
    other => anyhow::bail!("unknown search mode `{other}` (expected unified, metadata, or content)"),
  }
}

fn parse_dataset_type(raw: &str) -> Result<DatasetType> {
  DatasetType::parse(raw).ok_or_else(|| anyhow::anyhow!("unknown dataset type `{raw}`"))
}

fn parse_queue_mode(raw: &str) -> Result<QueueMode> {
  match raw {
    "manual" => Ok(QueueMode::Manual),
    "auto" => Ok(QueueMode::Auto),
    other => anyhow::bail!("unknown queue mode `{other}` (expected manual or auto)"),
  }
}

fn parse_hook_mode(raw: &str) -> Result<HookMode> {
  match raw {
    "manual" => Ok(HookMode::Manual),
    "auto" => Ok(HookMode::Auto),
    other => anyhow::bail!("unknown hook mode `{other}` (expected manual or auto)"),
  }
}

fn filter() -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Console-only logging for ordinary CLI invocations.
fn init_cli_logging() {
  tracing_subscriber::fmt().with_env_filter(filter()).init();
}

/// The worker runs detached and unattended, so its logs go to a daily
/// rolling file under `.code-query/` (spec.md §4.8 "logs to a rotating
/// file") instead of stdout. The returned `WorkerGuard` must be kept alive
/// for the duration of the program or the non-blocking writer drops
/// buffered lines on exit.
fn init_worker_logging(root: &Path) -> Result<WorkerGuard> {
  let log_dir = cq_daemon::log_dir(root);
  std::fs::create_dir_all(&log_dir)?;
  let file_appender = tracing_appender::rolling::daily(&log_dir, cq_daemon::WORKER_LOG_FILE_NAME);
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::registry()
    .with(filter())
    .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_writer))
    .init();
  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  // Use a rolling file appender for the worker, console-only otherwise.
  let _guard = match &cli.command {
    Commands::Worker { .. } => Some(init_worker_logging(&project_root()?)?),
    _ => {
      init_cli_logging();
      None
    }
  };

  match cli.command {
    Commands::Init { dataset, source } => cmd_init(&dataset, &source),
    Commands::Search { query, dataset, mode, limit, json } => cmd_search(&query, &dataset, &mode, limit, json),
    Commands::Index { dataset, source, update_existing } => cmd_index(&dataset, &source, update_existing),
    Commands::Dataset { command } => cmd_dataset(command),
    Commands::Hook { command } => cmd_hook(command).await,
    Commands::Worker { command } => cmd_worker(command).await,
  }
}

fn cmd_init(dataset: &str, source: &str) -> Result<()> {
  let root = project_root()?;
  let cfg = ProjectConfig::new(dataset, source);
  cfg.validate(&root).map_err(|e| anyhow::anyhow!("invalid project config: {e}"))?;
  cq_core::config::save(&root, &cfg)?;

  let backend = open_backend(&root)?;
  let source_dir = root.join(source);
  let svc = cq_dataset::DatasetService::new(&backend);
  match svc.create(dataset, source_dir.to_str().unwrap_or(source), DatasetType::Main, None, None) {
    Ok(()) => println!("created dataset `{dataset}` over `{source}`"),
    Err(cq_dataset::DatasetError::Conflict(_)) => println!("dataset `{dataset}` already exists, config refreshed"),
    Err(e) => return Err(e.into()),
  }

  let files_documented = !backend.get_dataset_files(dataset)?.is_empty();
  let checklist = cq_core::config::recommend_setup(&root, Some(&cfg), files_documented, cq_core::is_hook_installed(&root, HookKind::PreCommit));
  if !checklist.is_ready() {
    println!("next steps: run `cq-cli index --dataset {dataset}` and `cq-cli hook install pre-commit --dataset {dataset}`");
  }
  Ok(())
}

fn cmd_search(query: &str, dataset: &str, mode: &str, limit: u32, json: bool) -> Result<()> {
  let root = project_root()?;
  let backend = open_backend(&root)?;
  let mode = parse_search_mode(mode)?;
  let cfg = SearchConfig { search_mode: mode, max_results: limit, ..SearchConfig::default() };
  let outcome = cq_search::execute(&backend, dataset, query, cfg);

  for warning in &outcome.warnings {
    tracing::warn!("{warning}");
  }

  if json {
    println!("{}", serde_json::to_string_pretty(&outcome.hits)?);
  } else if outcome.hits.is_empty() {
    println!("no matches for `{query}` in dataset `{dataset}`");
    for warning in &outcome.warnings {
      println!("warning: {warning}");
    }
  } else {
    for hit in &outcome.hits {
      println!("{:.3}  {}  ({})", hit.score, hit.filepath, hit.match_type.as_str());
      if let Some(snippet) = &hit.snippet {
        println!("      {snippet}");
      }
    }
  }
  Ok(())
}

fn cmd_index(dataset: &str, source: &str, update_existing: bool) -> Result<()> {
  let root = project_root()?;
  let backend = open_backend(&root)?;
  let source_dir = root.join(source);

  let registry = AnalyzerRegistry::new();
  let pipeline = Pipeline::new(&backend, &registry);
  let progress = Progress::new();
  let cancel = CancellationToken::new();
  let config = PipelineConfig {
    update_existing,
    ..PipelineConfig::default()
  };

  pipeline.run(dataset, &source_dir, &config, &progress, &cancel)?;

  let snapshot = progress.snapshot();
  println!(
    "indexed dataset `{dataset}`: {} processed, {} ok, {} failed, {} skipped",
    snapshot.processed, snapshot.successful, snapshot.failed, snapshot.skipped
  );
  for err in &snapshot.errors {
    eprintln!("  {err}");
  }
  Ok(())
}

fn cmd_dataset(command: DatasetCommands) -> Result<()> {
  let root = project_root()?;
  let backend = open_backend(&root)?;
  let svc = cq_dataset::DatasetService::new(&backend);

  match command {
    DatasetCommands::Create { id, source, dataset_type, parent, branch } => {
      svc.create(&id, &source, parse_dataset_type(&dataset_type)?, parent.as_deref(), branch.as_deref())?;
      println!("created dataset `{id}`");
    }
    DatasetCommands::Get { id } => match svc.get(&id)? {
      Some(ds) => println!("{}", serde_json::to_string_pretty(&ds)?),
      None => println!("dataset `{id}` not found"),
    },
    DatasetCommands::List { parent } => {
      let datasets = svc.list(parent.as_deref(), None)?;
      for ds in datasets {
        println!("{}  ({} files, {})", ds.id, ds.files_count, ds.dataset_type.as_str());
      }
    }
    DatasetCommands::Fork { source, target } => {
      svc.fork(&source, &target)?;
      println!("forked `{source}` -> `{target}`");
    }
    DatasetCommands::Sync { source, target, repo, source_ref, target_ref } => {
      let applied = svc.sync(&source, &target, Path::new(&repo), &source_ref, &target_ref)?;
      println!("synced {applied} change(s) from `{source}` into `{target}`");
    }
    DatasetCommands::Diff { left, right } => {
      let entries = svc.diff(&left, &right)?;
      for entry in entries {
        println!("{:?}  {}", entry.kind, entry.filepath);
      }
    }
    DatasetCommands::Delete { id, force } => {
      svc.delete(&id, force)?;
      println!("deleted dataset `{id}`");
    }
    DatasetCommands::Stats { id } => {
      let stats = svc.stats(&id)?;
      println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    DatasetCommands::CleanupOrphans { repo, dry_run } => {
      let orphaned = svc.cleanup_orphaned_datasets(Path::new(&repo), dry_run)?;
      if orphaned.is_empty() {
        println!("no orphaned worktree datasets");
      } else {
        for id in orphaned {
          println!("{}{id}", if dry_run { "would remove: " } else { "removed: " });
        }
      }
    }
  }
  Ok(())
}

async fn cmd_hook(command: HookCommands) -> Result<()> {
  let root = project_root()?;
  match command {
    HookCommands::Install { kind, dataset, mode } => {
      let hook_kind = match kind.as_str() {
        "pre-commit" => HookKind::PreCommit,
        "post-merge" => HookKind::PostMerge,
        other => anyhow::bail!("unknown hook kind `{other}` (expected pre-commit or post-merge)"),
      };
      cq_core::install_hook(&root, hook_kind, parse_hook_mode(&mode)?, &dataset)?;
      println!("installed {kind} hook for dataset `{dataset}`");
      Ok(())
    }
    // Everything below this point runs FROM the installed git hook script
    // itself: an error here must never block the user's commit or merge, so
    // every failure is logged and swallowed rather than propagated.
    HookCommands::PreCommit { dataset, mode } => {
      run_pre_commit_entrypoint(&root, &dataset, &mode);
      Ok(())
    }
    HookCommands::PostMerge { dataset, mode: _ } => {
      run_post_merge_entrypoint(&root, &dataset);
      Ok(())
    }
  }
}

fn run_pre_commit_entrypoint(root: &Path, dataset: &str, mode: &str) {
  let queue_mode = match parse_queue_mode(mode) {
    Ok(m) => m,
    Err(e) => {
      tracing::warn!(error = %e, "pre-commit hook: invalid --mode, skipping");
      return;
    }
  };
  let backend = match open_backend(root) {
    Ok(b) => b,
    Err(e) => {
      tracing::warn!(error = %e, "pre-commit hook: failed to open storage, skipping");
      return;
    }
  };
  let registry = AnalyzerRegistry::new();
  cq_daemon::run_pre_commit(root, dataset, queue_mode, queue_mode == QueueMode::Auto, &backend, &registry);
}

fn run_post_merge_entrypoint(root: &Path, dataset: &str) {
  let backend = match open_backend(root) {
    Ok(b) => b,
    Err(e) => {
      tracing::warn!(error = %e, "post-merge hook: failed to open storage, skipping");
      return;
    }
  };
  println!("{}", cq_daemon::post_merge_guidance(root, dataset, &backend));
}

async fn cmd_worker(command: WorkerCommands) -> Result<()> {
  let WorkerCommands::Start { dataset: _ } = command;
  let root = project_root()?;
  let _lock = cq_daemon::WorkerLock::acquire(&root).context("another worker is already running")?;
  let backend = open_backend(&root)?;
  let registry = AnalyzerRegistry::new();
  let worker = cq_daemon::Worker::new(root.clone(), &backend, &registry, cq_daemon::WorkerConfig::default());

  let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
  tokio::spawn(async move {
    let _ = tokio::signal::ctrl_c().await;
    let _ = shutdown_tx.send(());
  });

  tracing::info!("worker started, polling `.code-query/file_queue.json`");
  worker.run(shutdown_rx).await;
  Ok(())
}
