use crate::application::step::{ChequeCursor, JobContext, Step};
use crate::domain::cheque::ChequeStatus;
use crate::domain::ports::ChequeStoreRef;
use crate::domain::run::StepReport;
use crate::error::{BatchError, Result};
use crate::interfaces::csv::cheque_reader::ChequeReader;
use crate::interfaces::csv::grouped_writer::{GroupedFileWriter, WriterConfig};
use crate::interfaces::files::scan_suffix;
use async_trait::async_trait;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Extracts the integrated cheques into `BBB.OOO.<suffix>` files.
pub struct ReconciliationWriteStep {
    store: ChequeStoreRef,
    extension: String,
    chunk_size: usize,
}

impl ReconciliationWriteStep {
    pub const NAME: &'static str = "reconciliation_write";

    pub fn new(store: ChequeStoreRef, extension: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            store,
            extension: extension.into(),
            chunk_size,
        }
    }

    async fn write_integrated(
        &self,
        writer: &mut GroupedFileWriter,
        report: &mut StepReport,
    ) -> Result<()> {
        let mut cursor =
            ChequeCursor::new(self.store.clone(), ChequeStatus::Integrated, self.chunk_size);
        while let Some(page) = cursor.next_page().await? {
            report.read_count += page.len();
            report.write_count += writer.write(&page)?;
            writer.update()?;
        }
        Ok(())
    }
}

#[async_trait]
impl Step for ReconciliationWriteStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn execute(&self, ctx: &mut JobContext) -> Result<StepReport> {
        let config = WriterConfig::reconciliation(&self.extension);
        let mut writer = GroupedFileWriter::new(config, &ctx.output_dir, None)?;
        writer.open()?;

        let mut report = StepReport::default();
        let written = self.write_integrated(&mut writer, &mut report).await;
        let summary = writer.close();
        written?;
        let summary = summary?;
        info!(files = summary.data_files.len(), "Reconciliation files written");
        ctx.reconciliation_files.extend(summary.data_files);
        Ok(report)
    }
}

/// Closes the lifecycle of the cheques listed in a reconciliation file.
///
/// Every entry is looked up by its full composite key among the cheques whose
/// status is accepted. No match skips the entry; more than one match is a
/// data-integrity failure. Matched cheques become processed, one chunk per
/// update.
pub struct ReconciliationValidateStep {
    store: ChequeStoreRef,
    search_dir: PathBuf,
    suffix: String,
    accepted: Vec<ChequeStatus>,
    chunk_size: usize,
}

impl ReconciliationValidateStep {
    pub const NAME: &'static str = "reconciliation_validate";

    pub fn new(
        store: ChequeStoreRef,
        search_dir: impl Into<PathBuf>,
        suffix: impl Into<String>,
        accepted: Vec<ChequeStatus>,
        chunk_size: usize,
    ) -> Self {
        Self {
            store,
            search_dir: search_dir.into(),
            suffix: suffix.into(),
            accepted,
            chunk_size: chunk_size.max(1),
        }
    }

    fn resolve_input(&self, ctx: &JobContext) -> Result<PathBuf> {
        if let Some(path) = &ctx.reconciliation_input {
            return Ok(path.clone());
        }
        scan_suffix(&self.search_dir, &self.suffix)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                BatchError::fs(
                    &self.search_dir,
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("no .{} file to reconcile", self.suffix),
                    ),
                )
            })
    }

    async fn commit(&self, ids: &mut Vec<u64>) -> Result<usize> {
        let chunk = std::mem::replace(ids, Vec::with_capacity(self.chunk_size));
        let moved = self
            .store
            .advance_chunk(&chunk, ChequeStatus::Processed)
            .await?;
        debug!(moved, "Processed chunk");
        Ok(moved)
    }
}

#[async_trait]
impl Step for ReconciliationValidateStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn execute(&self, ctx: &mut JobContext) -> Result<StepReport> {
        let path = self.resolve_input(ctx)?;
        info!(file = %path.display(), "Reconciling");
        ctx.reconciliation_input = Some(path.clone());

        let file = File::open(&path).map_err(|e| BatchError::fs(&path, e))?;
        let reader = ChequeReader::new(BufReader::new(file), path.display().to_string());

        let mut report = StepReport::default();
        let mut ids = Vec::with_capacity(self.chunk_size);

        for entry in reader.records() {
            let entry = entry?;
            report.read_count += 1;

            let matches = self
                .store
                .find_matching(&entry.composite_key(), &self.accepted)
                .await?;
            match matches.as_slice() {
                [] => {
                    warn!(cheque = %entry.cheque_number, "No matching cheque, entry skipped");
                    report.skip_count += 1;
                }
                [cheque] => {
                    if ids.contains(&cheque.id) {
                        report.skip_count += 1;
                        continue;
                    }
                    ids.push(cheque.id);
                    if ids.len() == self.chunk_size {
                        report.write_count += self.commit(&mut ids).await?;
                    }
                }
                many => {
                    return Err(BatchError::DataIntegrity(format!(
                        "cheque {} matches {} records",
                        entry.cheque_number,
                        many.len()
                    )));
                }
            }
        }
        if !ids.is_empty() {
            report.write_count += self.commit(&mut ids).await?;
        }
        Ok(report)
    }
}
