use crate::domain::cheque::{Cheque, ChequeStatus};
use crate::domain::ports::ChequeStoreRef;
use crate::domain::run::StepReport;
use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// Artefacts handed from one step to the next within a single run.
#[derive(Debug, Clone, Default)]
pub struct JobContext {
    pub input_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
    /// Remittance files seen when ingestion started.
    pub snapshot: Option<Vec<PathBuf>>,
    pub lot_files: Vec<PathBuf>,
    pub control_files: Vec<PathBuf>,
    pub reconciliation_files: Vec<PathBuf>,
    /// Reconciliation file to validate; discovered when left empty.
    pub reconciliation_input: Option<PathBuf>,
}

impl JobContext {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_input_dir(mut self, input_dir: impl Into<PathBuf>) -> Self {
        self.input_dir = Some(input_dir.into());
        self
    }

    pub fn with_reconciliation_input(mut self, path: Option<PathBuf>) -> Self {
        self.reconciliation_input = path;
        self
    }
}

/// One stage of a job.
///
/// A step either completes with its item counters or fails; a failure aborts
/// the steps that follow it.
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: &mut JobContext) -> Result<StepReport>;
}

/// Streams the cheques with a given status in id order, one page at a time.
///
/// The cursor remembers the last id it returned, so records changing status
/// behind it do not shift later pages.
pub struct ChequeCursor {
    store: ChequeStoreRef,
    status: ChequeStatus,
    after_id: u64,
    page_size: usize,
    exhausted: bool,
}

impl ChequeCursor {
    pub fn new(store: ChequeStoreRef, status: ChequeStatus, page_size: usize) -> Self {
        Self {
            store,
            status,
            after_id: 0,
            page_size: page_size.max(1),
            exhausted: false,
        }
    }

    /// Returns the next page, or `None` once the cursor is drained.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Cheque>>> {
        if self.exhausted {
            return Ok(None);
        }
        let page = self
            .store
            .page_by_status(self.status, self.after_id, self.page_size)
            .await?;
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        match page.last() {
            Some(last) => {
                self.after_id = last.id;
                Ok(Some(page))
            }
            None => Ok(None),
        }
    }
}
