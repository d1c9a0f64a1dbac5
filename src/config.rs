use crate::domain::cheque::ChequeStatus;
use crate::domain::lot::{LOT_SEQUENCE_MAX, LOT_SEQUENCE_MIN};
use crate::error::{BatchError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What File-Marking does when a rename fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkingFailurePolicy {
    /// Mark the remaining files, then fail the step (and the job).
    #[default]
    FailJob,
    /// Log the failure and complete the step.
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
    pub completion_timeout_secs: u64,
    pub ack_timeout_secs: u64,
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            completion_timeout_secs: 300,
            ack_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// How long a settled run stays queryable.
    pub ttl_secs: u64,
    /// Upper bound on tracked runs; only settled runs are evicted.
    pub capacity: usize,
}

impl RegistryConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3_600,
            capacity: 1_024,
        }
    }
}

/// Runtime settings of the batch pipeline.
///
/// Every field has a default, so a configuration file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub chunk_size: usize,
    pub remittance_suffix: String,
    pub done_marker: String,
    pub output_dir: PathBuf,
    pub ack_dir: PathBuf,
    pub ack_suffix: String,
    pub receipt_dir: PathBuf,
    pub receipt_suffix: String,
    pub reconciliation_dir: PathBuf,
    pub reconciliation_suffix: String,
    pub lot_sequence_start: u32,
    pub marking_policy: MarkingFailurePolicy,
    /// Statuses a cheque may have to be closed by a reconciliation entry.
    pub reconcile_from: Vec<ChequeStatus>,
    pub monitor: MonitorConfig,
    pub registry: RegistryConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10,
            remittance_suffix: "remise".to_string(),
            done_marker: "DONE".to_string(),
            output_dir: PathBuf::from("output"),
            ack_dir: PathBuf::from("ord"),
            ack_suffix: "ORD".to_string(),
            receipt_dir: PathBuf::from("crl"),
            receipt_suffix: "CRL".to_string(),
            reconciliation_dir: PathBuf::from("output"),
            reconciliation_suffix: "CRA".to_string(),
            lot_sequence_start: LOT_SEQUENCE_MIN,
            marking_policy: MarkingFailurePolicy::default(),
            reconcile_from: vec![ChequeStatus::Integrated],
            monitor: MonitorConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl BatchConfig {
    /// Loads a JSON configuration file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| BatchError::fs(path, e))?;
        let config: BatchConfig = serde_json::from_str(&raw)
            .map_err(|e| BatchError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(BatchError::Config("chunk_size must be positive".into()));
        }
        if self.monitor.poll_interval_ms == 0 {
            return Err(BatchError::Config(
                "monitor.poll_interval_ms must be positive".into(),
            ));
        }
        if !(LOT_SEQUENCE_MIN..=LOT_SEQUENCE_MAX).contains(&self.lot_sequence_start) {
            return Err(BatchError::Config(format!(
                "lot_sequence_start must be within {}..={}",
                LOT_SEQUENCE_MIN, LOT_SEQUENCE_MAX
            )));
        }
        let suffixes = [
            ("remittance_suffix", &self.remittance_suffix),
            ("done_marker", &self.done_marker),
            ("ack_suffix", &self.ack_suffix),
            ("receipt_suffix", &self.receipt_suffix),
            ("reconciliation_suffix", &self.reconciliation_suffix),
        ];
        for (name, value) in suffixes {
            if value.trim().is_empty() {
                return Err(BatchError::Config(format!("{} must not be empty", name)));
            }
        }
        if self.reconcile_from.contains(&ChequeStatus::Processed) {
            return Err(BatchError::Config(
                "reconcile_from cannot include processed".into(),
            ));
        }
        Ok(())
    }
}
