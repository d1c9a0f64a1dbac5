use chequelot::application::orchestrator::{Orchestrator, ReconcileRequest, TriggerRequest};
use chequelot::config::BatchConfig;
use chequelot::domain::ports::ChequeStoreRef;
use chequelot::domain::run::ExecutionStatus;
use chequelot::infrastructure::in_memory::InMemoryChequeStore;
#[cfg(feature = "storage-rocksdb")]
use chequelot::infrastructure::rocksdb::RocksDBStore;
use chequelot::interfaces::files::list_pending_remittances;
use chequelot::logging;
use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const STATUS_POLL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file. Flags below override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest remittance files, write lots and wait for the acknowledgment
    Run(RunArgs),
    /// Write the reconciliation extract and validate a reconciliation file
    Reconcile(ReconcileArgs),
    /// List remittance files waiting for ingestion
    List {
        #[arg(long)]
        input_dir: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    input_dir: PathBuf,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    ack_dir: Option<PathBuf>,
    #[arg(long)]
    receipt_dir: Option<PathBuf>,
    #[arg(long)]
    poll_interval_ms: Option<u64>,
    #[arg(long)]
    completion_timeout_secs: Option<u64>,
    #[arg(long)]
    ack_timeout_secs: Option<u64>,
    /// Print the run id and exit without waiting for the run to settle
    #[arg(long)]
    no_wait: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut BatchConfig) {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(dir) = &self.ack_dir {
            config.ack_dir = dir.clone();
        }
        if let Some(dir) = &self.receipt_dir {
            config.receipt_dir = dir.clone();
        }
        if let Some(ms) = self.poll_interval_ms {
            config.monitor.poll_interval_ms = ms;
        }
        if let Some(secs) = self.completion_timeout_secs {
            config.monitor.completion_timeout_secs = secs;
        }
        if let Some(secs) = self.ack_timeout_secs {
            config.monitor.ack_timeout_secs = secs;
        }
    }
}

#[derive(Args)]
struct ReconcileArgs {
    /// Reconciliation file to validate; defaults to the first one found
    #[arg(long)]
    cra_file: Option<PathBuf>,
    /// Directory receiving the extract, also searched for reconciliation files
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let mut config = match &cli.config {
        Some(path) => BatchConfig::from_file(path).into_diagnostic()?,
        None => BatchConfig::default(),
    };

    match cli.command {
        Commands::List { input_dir } => {
            let pending = list_pending_remittances(&input_dir, &config.remittance_suffix)
                .into_diagnostic()?;
            print_json(&pending)
        }
        Commands::Run(args) => {
            args.apply(&mut config);
            let orchestrator = build_orchestrator(cli.db_path, config)?;

            let run_id = orchestrator
                .trigger(TriggerRequest {
                    input_dir: args.input_dir,
                    output_dir: None,
                })
                .await;
            println!("{}", run_id);
            if args.no_wait {
                return Ok(());
            }

            let status = orchestrator
                .wait_until_settled(run_id, STATUS_POLL)
                .await
                .ok_or_else(|| miette!("run {} is no longer tracked", run_id))?;
            print_json(&status)?;
            if status.status == ExecutionStatus::Failed {
                return Err(miette!("run {} failed", run_id));
            }
            Ok(())
        }
        Commands::Reconcile(args) => {
            if let Some(dir) = &args.output_dir {
                config.output_dir = dir.clone();
                config.reconciliation_dir = dir.clone();
            }
            let orchestrator = build_orchestrator(cli.db_path, config)?;

            let run_id = orchestrator
                .trigger_reconciliation(ReconcileRequest {
                    cra_file: args.cra_file,
                    output_dir: None,
                })
                .await;
            println!("{}", run_id);

            let status = orchestrator
                .wait_until_settled(run_id, STATUS_POLL)
                .await
                .ok_or_else(|| miette!("run {} is no longer tracked", run_id))?;
            print_json(&status)?;
            if status.status == ExecutionStatus::Failed {
                return Err(miette!("run {} failed", run_id));
            }
            Ok(())
        }
    }
}

fn build_orchestrator(db_path: Option<PathBuf>, config: BatchConfig) -> Result<Orchestrator> {
    let store = open_store(db_path)?;
    let orchestrator = Orchestrator::new(store, config).into_diagnostic()?;
    orchestrator.ensure_directories().into_diagnostic()?;
    Ok(orchestrator)
}

fn open_store(db_path: Option<PathBuf>) -> Result<ChequeStoreRef> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = db_path {
        // Use persistent storage (RocksDB)
        let store = RocksDBStore::open(db_path).into_diagnostic()?;
        return Ok(Arc::new(store));
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }

    Ok(Arc::new(InMemoryChequeStore::new()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{}", json);
    Ok(())
}
