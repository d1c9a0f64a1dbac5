use crate::application::step::{ChequeCursor, JobContext, Step};
use crate::domain::cheque::ChequeStatus;
use crate::domain::lot::LotSequence;
use crate::domain::ports::ChequeStoreRef;
use crate::domain::run::StepReport;
use crate::error::Result;
use crate::interfaces::csv::grouped_writer::{GroupedFileWriter, WriterSummary};
use async_trait::async_trait;
use tracing::info;

/// Writes every pending cheque into its lot file and emits the order file.
pub struct LotGroupingStep {
    store: ChequeStoreRef,
    sequence: LotSequence,
    chunk_size: usize,
}

impl LotGroupingStep {
    pub const NAME: &'static str = "lot_grouping";

    pub fn new(store: ChequeStoreRef, sequence: LotSequence, chunk_size: usize) -> Self {
        Self {
            store,
            sequence,
            chunk_size,
        }
    }

    async fn write_pending(
        &self,
        writer: &mut GroupedFileWriter,
        report: &mut StepReport,
    ) -> Result<()> {
        let mut cursor = ChequeCursor::new(self.store.clone(), ChequeStatus::Pending, self.chunk_size);
        while let Some(page) = cursor.next_page().await? {
            report.read_count += page.len();
            report.write_count += writer.write(&page)?;
            writer.update()?;
        }
        Ok(())
    }
}

/// Moves what the writer produced into the context.
fn collect(ctx: &mut JobContext, summary: WriterSummary) {
    ctx.lot_files.extend(summary.data_files);
    ctx.control_files.extend(summary.control_file);
}

#[async_trait]
impl Step for LotGroupingStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn execute(&self, ctx: &mut JobContext) -> Result<StepReport> {
        let mut writer = GroupedFileWriter::lot(&ctx.output_dir, self.sequence.clone());
        writer.open()?;

        let mut report = StepReport::default();
        let written = self.write_pending(&mut writer, &mut report).await;
        // Handles are released whatever happened above
        let closed = writer.close();

        match (written, closed) {
            (Ok(()), Ok(summary)) => {
                info!(
                    lots = summary.data_files.len(),
                    control = ?summary.control_file,
                    "Lot files written"
                );
                collect(ctx, summary);
                Ok(report)
            }
            (Err(e), closed) => {
                if let Ok(summary) = closed {
                    collect(ctx, summary);
                }
                Err(e)
            }
            (Ok(()), Err(e)) => Err(e),
        }
    }
}
