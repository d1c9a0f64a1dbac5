use crate::application::step::{ChequeCursor, JobContext, Step};
use crate::domain::cheque::ChequeStatus;
use crate::domain::ports::ChequeStoreRef;
use crate::domain::run::StepReport;
use crate::error::Result;
use async_trait::async_trait;
use tracing::debug;

/// Advances every pending cheque to submitted, one chunk per update.
pub struct StatusTransitionStep {
    store: ChequeStoreRef,
    chunk_size: usize,
}

impl StatusTransitionStep {
    pub const NAME: &'static str = "status_transition";

    pub fn new(store: ChequeStoreRef, chunk_size: usize) -> Self {
        Self { store, chunk_size }
    }
}

#[async_trait]
impl Step for StatusTransitionStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn execute(&self, _ctx: &mut JobContext) -> Result<StepReport> {
        let mut report = StepReport::default();
        let mut cursor = ChequeCursor::new(self.store.clone(), ChequeStatus::Pending, self.chunk_size);

        while let Some(page) = cursor.next_page().await? {
            let ids: Vec<u64> = page.iter().map(|c| c.id).collect();
            let moved = self
                .store
                .advance_chunk(&ids, ChequeStatus::Submitted)
                .await?;
            debug!(read = ids.len(), moved, "Submitted chunk");
            report.read_count += ids.len();
            report.write_count += moved;
            report.skip_count += ids.len() - moved;
        }
        Ok(report)
    }
}
