use super::registry::RunRegistry;
use crate::config::{BatchConfig, MonitorConfig};
use crate::domain::run::RunId;
use crate::error::{BatchError, Result};
use crate::interfaces::files::scan_suffix;
use serde::Serialize;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

pub const COMPLETION_TIMEOUT_CAUSE: &str = "job did not complete in time";
pub const ACK_TIMEOUT_CAUSE: &str = "external system did not respond in time";

/// Progress of the acknowledgment monitor of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MonitorState {
    WaitingForCompletion,
    WaitingForAck,
    GeneratingReconciliation,
    Completed { receipts: Vec<String> },
    Failed { cause: String },
}

impl MonitorState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MonitorState::Completed { .. } | MonitorState::Failed { .. }
        )
    }
}

/// Background watcher waiting for the external system to acknowledge a run.
///
/// It first waits for the lot step to record a control file, then for any
/// acknowledgment file to appear, and finally writes one empty receipt per
/// acknowledgment. Each wait is bounded by its own timeout; exceeding one
/// fails the monitor without touching the job itself.
pub struct AckMonitor {
    registry: RunRegistry,
    settings: MonitorConfig,
    ack_dir: PathBuf,
    ack_suffix: String,
    receipt_dir: PathBuf,
    receipt_suffix: String,
}

impl AckMonitor {
    pub fn new(registry: RunRegistry, config: &BatchConfig) -> Self {
        Self {
            registry,
            settings: config.monitor.clone(),
            ack_dir: config.ack_dir.clone(),
            ack_suffix: config.ack_suffix.clone(),
            receipt_dir: config.receipt_dir.clone(),
            receipt_suffix: config.receipt_suffix.clone(),
        }
    }

    /// Runs the monitor on its own task.
    pub fn spawn(self, run_id: RunId) -> JoinHandle<MonitorState> {
        tokio::spawn(async move { self.run(run_id).await })
    }

    /// Drives the state machine to a terminal state and returns it.
    pub async fn run(&self, run_id: RunId) -> MonitorState {
        self.enter(run_id, MonitorState::WaitingForCompletion).await;
        if let Err(e) = self.await_control_file(run_id).await {
            return self.fail(run_id, e).await;
        }

        self.enter(run_id, MonitorState::WaitingForAck).await;
        let acks = match self.await_acknowledgments().await {
            Ok(acks) => acks,
            Err(e) => return self.fail(run_id, e).await,
        };

        self.enter(run_id, MonitorState::GeneratingReconciliation).await;
        match self.write_receipts(&acks) {
            Ok(receipts) => {
                info!(%run_id, receipts = receipts.len(), "Acknowledgment received");
                let done = MonitorState::Completed { receipts };
                self.enter(run_id, done.clone()).await;
                done
            }
            Err(e) => self.fail(run_id, e).await,
        }
    }

    async fn enter(&self, run_id: RunId, state: MonitorState) {
        debug!(%run_id, ?state, "Monitor transition");
        self.registry.set_monitor_state(run_id, state).await;
    }

    async fn fail(&self, run_id: RunId, error: BatchError) -> MonitorState {
        let cause = error.to_string();
        warn!(%run_id, %cause, "Monitor failed");
        let failed = MonitorState::Failed { cause };
        self.enter(run_id, failed.clone()).await;
        failed
    }

    async fn await_control_file(&self, run_id: RunId) -> Result<()> {
        let deadline = Instant::now() + self.settings.completion_timeout();
        loop {
            let recorded = self.registry.control_files(run_id).await;
            if recorded.is_some_and(|files| !files.is_empty()) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BatchError::Timeout(COMPLETION_TIMEOUT_CAUSE.into()));
            }
            sleep(self.settings.poll_interval()).await;
        }
    }

    async fn await_acknowledgments(&self) -> Result<Vec<PathBuf>> {
        let deadline = Instant::now() + self.settings.ack_timeout();
        loop {
            match scan_suffix(&self.ack_dir, &self.ack_suffix) {
                Ok(acks) if !acks.is_empty() => return Ok(acks),
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Acknowledgment directory not readable yet"),
            }
            if Instant::now() >= deadline {
                return Err(BatchError::Timeout(ACK_TIMEOUT_CAUSE.into()));
            }
            sleep(self.settings.poll_interval()).await;
        }
    }

    /// Creates `<ack stem>.<receipt suffix>` for every acknowledgment. An
    /// existing receipt is left alone and not reported.
    fn write_receipts(&self, acks: &[PathBuf]) -> Result<Vec<String>> {
        fs::create_dir_all(&self.receipt_dir).map_err(|e| BatchError::fs(&self.receipt_dir, e))?;

        let mut receipts = Vec::with_capacity(acks.len());
        for ack in acks {
            let name = receipt_name(ack, &self.receipt_suffix);
            let path = self.receipt_dir.join(&name);
            match File::create_new(&path) {
                Ok(_) => {
                    info!(file = %path.display(), "Wrote receipt");
                    receipts.push(name);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    warn!(file = %path.display(), "Receipt already exists, skipped");
                }
                Err(e) => return Err(BatchError::fs(&path, e)),
            }
        }
        Ok(receipts)
    }
}

fn receipt_name(ack: &Path, suffix: &str) -> String {
    let stem = ack
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}.{}", stem, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use crate::domain::ports::ExecutionLedger;
    use std::time::Duration;
    use tempfile::tempdir;

    fn config(root: &Path) -> BatchConfig {
        BatchConfig {
            ack_dir: root.join("ord"),
            receipt_dir: root.join("crl"),
            ..Default::default()
        }
    }

    async fn registered(registry: &RunRegistry) -> RunId {
        let run_id = RunId::new();
        registry.register_run(run_id, "job", &["lot_grouping"]).await;
        run_id
    }

    #[test]
    fn test_receipt_name_swaps_suffix() {
        assert_eq!(
            receipt_name(Path::new("/x/012.001.2025010112.ORD"), "CRL"),
            "012.001.2025010112.CRL"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_waiting_for_completion() {
        let dir = tempdir().unwrap();
        let registry = RunRegistry::new(&RegistryConfig::default());
        let run_id = registered(&registry).await;

        let started = Instant::now();
        let state = AckMonitor::new(registry.clone(), &config(dir.path()))
            .run(run_id)
            .await;

        assert_eq!(
            state,
            MonitorState::Failed {
                cause: COMPLETION_TIMEOUT_CAUSE.into()
            }
        );
        assert!(started.elapsed() >= Duration::from_secs(300));
        assert_eq!(registry.status(run_id).await.unwrap().monitor, Some(state));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_waiting_for_ack() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        fs::create_dir_all(&config.ack_dir).unwrap();
        let registry = RunRegistry::new(&RegistryConfig::default());
        let run_id = registered(&registry).await;
        registry
            .record_control_files(run_id, &[dir.path().join("012.001.2025010112.ORD")])
            .await;

        let started = Instant::now();
        let state = AckMonitor::new(registry.clone(), &config).run(run_id).await;

        assert_eq!(
            state,
            MonitorState::Failed {
                cause: ACK_TIMEOUT_CAUSE.into()
            }
        );
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(120));
        assert!(waited < Duration::from_secs(130));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledgment_produces_receipts() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        fs::create_dir_all(&config.ack_dir).unwrap();
        fs::write(config.ack_dir.join("012.001.2025010112.ORD"), "").unwrap();
        fs::write(config.ack_dir.join("notes.txt"), "").unwrap();

        let registry = RunRegistry::new(&RegistryConfig::default());
        let run_id = registered(&registry).await;
        registry
            .record_control_files(run_id, &[dir.path().join("012.001.2025010112.ORD")])
            .await;

        let state = AckMonitor::new(registry.clone(), &config).run(run_id).await;

        assert_eq!(
            state,
            MonitorState::Completed {
                receipts: vec!["012.001.2025010112.CRL".into()]
            }
        );
        let receipt = config.receipt_dir.join("012.001.2025010112.CRL");
        assert_eq!(fs::read(&receipt).unwrap().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_control_file_recorded_while_waiting() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        fs::create_dir_all(&config.ack_dir).unwrap();
        fs::write(config.ack_dir.join("a.ORD"), "").unwrap();
        let registry = RunRegistry::new(&RegistryConfig::default());
        let run_id = registered(&registry).await;

        let handle = AckMonitor::new(registry.clone(), &config).spawn(run_id);
        tokio::time::sleep(Duration::from_secs(42)).await;
        assert_eq!(
            registry.status(run_id).await.unwrap().monitor,
            Some(MonitorState::WaitingForCompletion)
        );
        registry
            .record_control_files(run_id, &[dir.path().join("x.ORD")])
            .await;

        let state = handle.await.unwrap();
        assert!(matches!(state, MonitorState::Completed { .. }));
    }
}
