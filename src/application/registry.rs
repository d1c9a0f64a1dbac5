use super::monitor::MonitorState;
use crate::config::RegistryConfig;
use crate::domain::ports::ExecutionLedger;
use crate::domain::run::{ExecutionStatus, RunId, StepOutcome, StepReport};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepStatus {
    pub name: String,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(flatten)]
    pub report: StepReport,
}

/// Everything known about one run, as returned by the status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStatus {
    pub run_id: RunId,
    pub job: String,
    pub status: ExecutionStatus,
    pub steps: Vec<StepStatus>,
    pub lot_files: Vec<String>,
    pub control_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor: Option<MonitorState>,
}

impl RunStatus {
    pub fn step(&self, name: &str) -> Option<&StepStatus> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// True once nothing will change any more that a caller waits for: the
    /// job failed, or it completed and its monitor (if any) is terminal.
    pub fn is_settled(&self) -> bool {
        match self.status {
            ExecutionStatus::Failed => true,
            ExecutionStatus::Completed => self.monitor.as_ref().is_none_or(|m| m.is_terminal()),
            _ => false,
        }
    }
}

fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string())
        })
        .collect()
}

struct RunEntry {
    status: RunStatus,
    control_paths: Vec<PathBuf>,
    registered_at: Instant,
    settled_at: Option<Instant>,
}

impl RunEntry {
    fn refresh(&mut self) {
        if self.settled_at.is_none() && self.status.is_settled() {
            self.settled_at = Some(Instant::now());
        }
    }
}

/// In-process record of every triggered run.
///
/// Serves as the execution ledger of the jobs and as the status map shared
/// with the acknowledgment monitors. Settled runs expire after the TTL and are
/// evicted oldest first once the capacity is reached; runs still in flight
/// are never evicted.
#[derive(Clone)]
pub struct RunRegistry {
    runs: Arc<RwLock<HashMap<RunId, RunEntry>>>,
    ttl: Duration,
    capacity: usize,
}

impl RunRegistry {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
            ttl: config.ttl(),
            capacity: config.capacity.max(1),
        }
    }

    pub async fn status(&self, run_id: RunId) -> Option<RunStatus> {
        let runs = self.runs.read().await;
        runs.get(&run_id).map(|entry| entry.status.clone())
    }

    /// Control files recorded for the run so far.
    pub async fn control_files(&self, run_id: RunId) -> Option<Vec<PathBuf>> {
        let runs = self.runs.read().await;
        runs.get(&run_id).map(|entry| entry.control_paths.clone())
    }

    /// Records a monitor transition. Returns false, leaving the state as is,
    /// when the run is unknown or its monitor already reached a terminal state.
    pub async fn set_monitor_state(&self, run_id: RunId, state: MonitorState) -> bool {
        let mut runs = self.runs.write().await;
        let Some(entry) = runs.get_mut(&run_id) else {
            return false;
        };
        if let Some(current) = &entry.status.monitor
            && current.is_terminal()
        {
            warn!(%run_id, ?current, rejected = ?state, "Monitor already settled");
            return false;
        }
        entry.status.monitor = Some(state);
        entry.refresh();
        true
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }

    /// Drops settled runs older than the TTL. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let mut runs = self.runs.write().await;
        self.sweep_locked(&mut runs)
    }

    fn sweep_locked(&self, runs: &mut HashMap<RunId, RunEntry>) -> usize {
        let before = runs.len();
        let ttl = self.ttl;
        runs.retain(|_, entry| entry.settled_at.is_none_or(|at| at.elapsed() < ttl));
        before - runs.len()
    }

    fn evict_for_capacity(&self, runs: &mut HashMap<RunId, RunEntry>) {
        while runs.len() >= self.capacity {
            let oldest = runs
                .iter()
                .filter_map(|(id, entry)| entry.settled_at.map(|at| (*id, at)))
                .min_by_key(|(_, at)| *at)
                .map(|(id, _)| id);
            match oldest {
                Some(id) => {
                    runs.remove(&id);
                    debug!(run_id = %id, "Evicted settled run");
                }
                None => {
                    warn!(runs = runs.len(), "Run registry full of active runs");
                    break;
                }
            }
        }
    }

    async fn update(&self, run_id: RunId, apply: impl FnOnce(&mut RunEntry)) {
        let mut runs = self.runs.write().await;
        match runs.get_mut(&run_id) {
            Some(entry) => {
                apply(entry);
                entry.refresh();
            }
            None => debug!(%run_id, "Update for unknown run ignored"),
        }
    }
}

#[async_trait]
impl ExecutionLedger for RunRegistry {
    async fn register_run(&self, run_id: RunId, job: &str, steps: &[&str]) {
        let mut runs = self.runs.write().await;
        let swept = self.sweep_locked(&mut runs);
        if swept > 0 {
            debug!(swept, "Expired settled runs");
        }
        self.evict_for_capacity(&mut runs);

        let status = RunStatus {
            run_id,
            job: job.to_string(),
            status: ExecutionStatus::NotStarted,
            steps: steps
                .iter()
                .map(|name| StepStatus {
                    name: name.to_string(),
                    status: ExecutionStatus::NotStarted,
                    cause: None,
                    report: StepReport::default(),
                })
                .collect(),
            lot_files: Vec::new(),
            control_files: Vec::new(),
            monitor: None,
        };
        runs.insert(
            run_id,
            RunEntry {
                status,
                control_paths: Vec::new(),
                registered_at: Instant::now(),
                settled_at: None,
            },
        );
    }

    async fn step_started(&self, run_id: RunId, step: &str) {
        self.update(run_id, |entry| {
            if !entry.status.status.is_terminal() {
                entry.status.status = ExecutionStatus::Running;
            }
            if let Some(s) = entry.status.steps.iter_mut().find(|s| s.name == step)
                && !s.status.is_terminal()
            {
                s.status = ExecutionStatus::Running;
            }
        })
        .await;
    }

    async fn step_finished(&self, run_id: RunId, step: &str, outcome: StepOutcome) {
        self.update(run_id, |entry| {
            let Some(s) = entry.status.steps.iter_mut().find(|s| s.name == step) else {
                return;
            };
            if s.status.is_terminal() {
                return;
            }
            match outcome {
                StepOutcome::Completed(report) => {
                    s.status = ExecutionStatus::Completed;
                    s.report = report;
                }
                StepOutcome::Failed(cause) => {
                    s.status = ExecutionStatus::Failed;
                    s.cause = Some(cause);
                }
            }
        })
        .await;
    }

    async fn job_finished(&self, run_id: RunId, status: ExecutionStatus) {
        self.update(run_id, |entry| {
            if !entry.status.status.is_terminal() {
                entry.status.status = status;
                debug!(
                    %run_id,
                    ?status,
                    elapsed_ms = entry.registered_at.elapsed().as_millis() as u64,
                    "Run finished"
                );
            }
        })
        .await;
    }

    async fn record_lot_files(&self, run_id: RunId, lot_files: &[PathBuf]) {
        self.update(run_id, |entry| {
            entry.status.lot_files = file_names(lot_files);
        })
        .await;
    }

    async fn record_control_files(&self, run_id: RunId, control_files: &[PathBuf]) {
        self.update(run_id, |entry| {
            entry.status.control_files = file_names(control_files);
            entry.control_paths = control_files.to_vec();
        })
        .await;
    }
}
