use crate::application::step::{JobContext, Step};
use crate::domain::cheque::ChequeRecord;
use crate::domain::ports::ChequeStoreRef;
use crate::domain::run::StepReport;
use crate::error::{BatchError, Result};
use crate::interfaces::csv::cheque_reader::ChequeReader;
use crate::interfaces::files::scan_suffix;
use async_trait::async_trait;
use std::fs::File;
use std::io::BufReader;
use tracing::{debug, info};

/// Parses every pending remittance file and persists the cheques in chunks.
///
/// The directory listing is taken once, when the step starts. Each chunk is
/// one atomic insert; a parse or persistence failure drops the chunk being
/// built and fails the step, leaving earlier chunks committed.
pub struct IngestionStep {
    store: ChequeStoreRef,
    suffix: String,
    chunk_size: usize,
}

impl IngestionStep {
    pub const NAME: &'static str = "ingestion";

    pub fn new(store: ChequeStoreRef, suffix: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            store,
            suffix: suffix.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    async fn commit(&self, chunk: &mut Vec<ChequeRecord>) -> Result<usize> {
        let records = std::mem::replace(chunk, Vec::with_capacity(self.chunk_size));
        let inserted = self.store.insert_chunk(records).await?;
        debug!(count = inserted.len(), "Committed chunk");
        Ok(inserted.len())
    }
}

#[async_trait]
impl Step for IngestionStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn execute(&self, ctx: &mut JobContext) -> Result<StepReport> {
        let input_dir = ctx
            .input_dir
            .clone()
            .ok_or_else(|| BatchError::Config("ingestion needs an input directory".into()))?;

        let snapshot = scan_suffix(&input_dir, &self.suffix)?;
        info!(dir = %input_dir.display(), files = snapshot.len(), "Remittance files found");
        ctx.snapshot = Some(snapshot.clone());

        let mut report = StepReport::default();
        let mut chunk = Vec::with_capacity(self.chunk_size);

        for path in &snapshot {
            let file = File::open(path).map_err(|e| BatchError::fs(path, e))?;
            let reader = ChequeReader::new(BufReader::new(file), path.display().to_string());

            for record in reader.records() {
                chunk.push(record?);
                report.read_count += 1;
                if chunk.len() == self.chunk_size {
                    report.write_count += self.commit(&mut chunk).await?;
                }
            }
        }
        if !chunk.is_empty() {
            report.write_count += self.commit(&mut chunk).await?;
        }

        Ok(report)
    }
}
