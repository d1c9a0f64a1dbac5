use super::job::Job;
use super::monitor::{AckMonitor, MonitorState};
use super::registry::{RunRegistry, RunStatus};
use super::step::JobContext;
use super::steps::{
    FileMarkingStep, IngestionStep, LotGroupingStep, ReconciliationValidateStep,
    ReconciliationWriteStep, StatusTransitionStep,
};
use crate::config::BatchConfig;
use crate::domain::lot::LotSequence;
use crate::domain::ports::{ChequeStoreRef, ExecutionLedger};
use crate::domain::run::RunId;
use crate::error::{BatchError, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const REMITTANCE_JOB: &str = "cheque_remittance";
pub const RECONCILIATION_JOB: &str = "cheque_reconciliation";

/// Input of the remittance job.
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    pub input_dir: PathBuf,
    /// Where lot and order files go; the configured output directory if unset.
    pub output_dir: Option<PathBuf>,
}

/// Input of the reconciliation job.
#[derive(Debug, Clone, Default)]
pub struct ReconcileRequest {
    /// File to validate; the first reconciliation file found if unset.
    pub cra_file: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

/// Process-wide entry point: owns the store, the lot sequence and the run
/// registry, and starts jobs on background tasks.
#[derive(Clone)]
pub struct Orchestrator {
    store: ChequeStoreRef,
    registry: RunRegistry,
    sequence: LotSequence,
    config: Arc<BatchConfig>,
}

impl Orchestrator {
    pub fn new(store: ChequeStoreRef, config: BatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            registry: RunRegistry::new(&config.registry),
            sequence: LotSequence::new(config.lot_sequence_start)?,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn sequence(&self) -> &LotSequence {
        &self.sequence
    }

    /// Creates the output, acknowledgment, receipt and reconciliation
    /// directories.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.config.output_dir,
            &self.config.ack_dir,
            &self.config.receipt_dir,
            &self.config.reconciliation_dir,
        ] {
            fs::create_dir_all(dir).map_err(|e| BatchError::fs(dir, e))?;
        }
        Ok(())
    }

    /// Ingestion, file marking, lot grouping, status transition.
    pub fn remittance_job(&self) -> Job {
        let config = &self.config;
        Job::new(REMITTANCE_JOB)
            .with_step(IngestionStep::new(
                self.store.clone(),
                &config.remittance_suffix,
                config.chunk_size,
            ))
            .with_step(FileMarkingStep::new(
                &config.remittance_suffix,
                &config.done_marker,
                config.marking_policy,
            ))
            .with_step(LotGroupingStep::new(
                self.store.clone(),
                self.sequence.clone(),
                config.chunk_size,
            ))
            .with_step(StatusTransitionStep::new(
                self.store.clone(),
                config.chunk_size,
            ))
    }

    /// Reconciliation write, then reconciliation validate.
    pub fn reconciliation_job(&self) -> Job {
        let config = &self.config;
        Job::new(RECONCILIATION_JOB)
            .with_step(ReconciliationWriteStep::new(
                self.store.clone(),
                &config.reconciliation_suffix,
                config.chunk_size,
            ))
            .with_step(ReconciliationValidateStep::new(
                self.store.clone(),
                &config.reconciliation_dir,
                &config.reconciliation_suffix,
                config.reconcile_from.clone(),
                config.chunk_size,
            ))
    }

    /// Starts the remittance job and its acknowledgment monitor. Returns as
    /// soon as the run is registered.
    pub async fn trigger(&self, request: TriggerRequest) -> RunId {
        let output_dir = request
            .output_dir
            .unwrap_or_else(|| self.config.output_dir.clone());
        let ctx = JobContext::new(output_dir).with_input_dir(request.input_dir);

        let run_id = self.start(self.remittance_job(), ctx, true).await;
        AckMonitor::new(self.registry.clone(), &self.config).spawn(run_id);
        run_id
    }

    /// Starts the reconciliation job. Returns as soon as the run is
    /// registered.
    pub async fn trigger_reconciliation(&self, request: ReconcileRequest) -> RunId {
        let output_dir = request
            .output_dir
            .unwrap_or_else(|| self.config.output_dir.clone());
        let ctx = JobContext::new(output_dir).with_reconciliation_input(request.cra_file);
        self.start(self.reconciliation_job(), ctx, false).await
    }

    async fn start(&self, job: Job, mut ctx: JobContext, monitored: bool) -> RunId {
        let run_id = RunId::new();
        self.registry
            .register_run(run_id, job.name(), &job.step_names())
            .await;
        if monitored {
            self.registry
                .set_monitor_state(run_id, MonitorState::WaitingForCompletion)
                .await;
        }
        info!(%run_id, job = job.name(), "Run triggered");

        let registry = self.registry.clone();
        tokio::spawn(async move {
            job.run(run_id, &mut ctx, &registry).await;
        });
        run_id
    }

    pub async fn status(&self, run_id: RunId) -> Option<RunStatus> {
        self.registry.status(run_id).await
    }

    /// Polls the run until it settles. `None` if the run is unknown or was
    /// evicted meanwhile.
    pub async fn wait_until_settled(&self, run_id: RunId, poll: Duration) -> Option<RunStatus> {
        loop {
            let status = self.status(run_id).await?;
            if status.is_settled() {
                return Some(status);
            }
            tokio::time::sleep(poll).await;
        }
    }
}
