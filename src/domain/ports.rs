use super::cheque::{Cheque, ChequeRecord, ChequeStatus, CompositeKey};
use super::run::{ExecutionStatus, RunId, StepOutcome};
use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Storage of cheque records.
///
/// Every method taking a batch is atomic: either the whole batch is applied
/// or none of it is.
#[async_trait]
pub trait ChequeStore: Send + Sync {
    /// Persists a chunk of records, assigning increasing identifiers.
    ///
    /// Fails the whole chunk with `BatchError::Persistence` if any cheque
    /// number already exists or appears twice in the chunk.
    async fn insert_chunk(&self, records: Vec<ChequeRecord>) -> Result<Vec<Cheque>>;

    /// Returns up to `limit` cheques with `status` and an id greater than
    /// `after_id`, ordered by id.
    async fn page_by_status(
        &self,
        status: ChequeStatus,
        after_id: u64,
        limit: usize,
    ) -> Result<Vec<Cheque>>;

    /// Moves each listed cheque forward to `target`.
    ///
    /// Cheques already at or beyond `target` are left untouched. Returns the
    /// number of cheques that changed.
    async fn advance_chunk(&self, ids: &[u64], target: ChequeStatus) -> Result<usize>;

    /// Returns every cheque matching `key` whose status is in `statuses`.
    async fn find_matching(
        &self,
        key: &CompositeKey,
        statuses: &[ChequeStatus],
    ) -> Result<Vec<Cheque>>;

    async fn get(&self, id: u64) -> Result<Option<Cheque>>;

    async fn count(&self) -> Result<usize>;
}

pub type ChequeStoreRef = Arc<dyn ChequeStore>;

/// Sink for job and step execution status.
///
/// Terminal step entries are written once per run attempt; later writes for
/// the same step are ignored.
#[async_trait]
pub trait ExecutionLedger: Send + Sync {
    async fn register_run(&self, run_id: RunId, job: &str, steps: &[&str]);
    async fn step_started(&self, run_id: RunId, step: &str);
    async fn step_finished(&self, run_id: RunId, step: &str, outcome: StepOutcome);
    async fn job_finished(&self, run_id: RunId, status: ExecutionStatus);
    async fn record_lot_files(&self, run_id: RunId, lot_files: &[PathBuf]);
    async fn record_control_files(&self, run_id: RunId, control_files: &[PathBuf]);
}
