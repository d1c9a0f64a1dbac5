use super::layout::{DELIMITER, Field};
use crate::domain::cheque::{Cheque, LotKey};
use crate::domain::lot::{LotSequence, NameParts, NameTemplate};
use crate::error::{BatchError, Result};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::PathBuf;
use tracing::{debug, info};

/// Command type written to every control file.
pub const CONTROL_COMMAND: &str = "INLOT";
const CONTROL_HEADER: [&str; 3] = ["command_type", "lot_number", "operation_type"];

/// Shape of the files produced by a [`GroupedFileWriter`].
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Columns written for every cheque, in order.
    pub fields: Vec<Field>,
    pub delimiter: u8,
    /// Name of the per-group data file.
    pub data_name: NameTemplate,
    /// Whether each group draws a lot number from the shared sequence.
    pub sequenced: bool,
    /// Name of the control file summarising the first group, if any.
    pub control_name: Option<NameTemplate>,
}

impl WriterConfig {
    /// `BBB.000.SSS.OOO.LOT` data files plus a `BBB.SSS.YYYYMMDDHH.ORD`
    /// control file.
    pub fn lot() -> Self {
        Self {
            fields: Field::OUTPUT.to_vec(),
            delimiter: DELIMITER,
            data_name: NameTemplate::new("{bank}.000.{lot}.{op}", "LOT"),
            sequenced: true,
            control_name: Some(NameTemplate::new("{bank}.{lot}.{stamp}", "ORD")),
        }
    }

    /// `BBB.OOO.{extension}` data files, no numbering, no control file.
    pub fn reconciliation(extension: &str) -> Self {
        Self {
            fields: Field::OUTPUT.to_vec(),
            delimiter: DELIMITER,
            data_name: NameTemplate::new("{bank}.{op}", extension),
            sequenced: false,
            control_name: None,
        }
    }
}

/// Files produced during one writer lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterSummary {
    pub data_files: Vec<PathBuf>,
    pub control_file: Option<PathBuf>,
    pub rows_written: usize,
}

struct OpenGroup {
    key: LotKey,
    lot: Option<u32>,
    path: PathBuf,
    writer: csv::Writer<File>,
}

/// Writes cheques into one delimited file per (beneficiary bank, operation
/// type) group.
///
/// Lifecycle: [`open`](Self::open), any number of [`write`](Self::write) and
/// [`update`](Self::update) calls, then [`close`](Self::close). Groups first
/// seen in earlier batches keep appending to the same file. `close` releases
/// every handle and, when configured, writes the control file for the first
/// group of the lifetime. The writer can be reopened afterwards; the lot
/// sequence is shared and keeps counting.
pub struct GroupedFileWriter {
    config: WriterConfig,
    output_dir: PathBuf,
    sequence: Option<LotSequence>,
    groups: Vec<OpenGroup>,
    index: HashMap<LotKey, usize>,
    first_group: Option<usize>,
    rows_written: usize,
    is_open: bool,
}

impl GroupedFileWriter {
    pub fn new(
        config: WriterConfig,
        output_dir: impl Into<PathBuf>,
        sequence: Option<LotSequence>,
    ) -> Result<Self> {
        if config.sequenced && sequence.is_none() {
            return Err(BatchError::Config(
                "a sequenced writer needs a lot sequence".into(),
            ));
        }
        Ok(Self::with_parts(config, output_dir.into(), sequence))
    }

    fn with_parts(
        config: WriterConfig,
        output_dir: PathBuf,
        sequence: Option<LotSequence>,
    ) -> Self {
        Self {
            config,
            output_dir,
            sequence,
            groups: Vec::new(),
            index: HashMap::new(),
            first_group: None,
            rows_written: 0,
            is_open: false,
        }
    }

    /// Lot-file writer drawing numbers from `sequence`.
    pub fn lot(output_dir: impl Into<PathBuf>, sequence: LotSequence) -> Self {
        Self::with_parts(WriterConfig::lot(), output_dir.into(), Some(sequence))
    }

    /// Starts a lifetime, creating the output directory if needed.
    pub fn open(&mut self) -> Result<()> {
        fs::create_dir_all(&self.output_dir).map_err(|e| BatchError::fs(&self.output_dir, e))?;
        self.groups.clear();
        self.index.clear();
        self.first_group = None;
        self.rows_written = 0;
        self.is_open = true;
        Ok(())
    }

    /// Writes one batch. Returns the number of cheques written.
    pub fn write(&mut self, batch: &[Cheque]) -> Result<usize> {
        if !self.is_open {
            return Err(BatchError::Internal(Box::new(std::io::Error::other(
                "writer is not open",
            ))));
        }
        if batch.is_empty() {
            return Ok(0);
        }

        // Partition preserving the order in which keys first appear
        let mut order: Vec<LotKey> = Vec::new();
        let mut buckets: HashMap<LotKey, Vec<&Cheque>> = HashMap::new();
        for cheque in batch {
            let key = cheque.record.lot_key();
            buckets
                .entry(key)
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push(cheque);
        }

        for key in order {
            let slot = self.group_for(key)?;
            let group = &mut self.groups[slot];
            for cheque in buckets.remove(&key).unwrap_or_default() {
                let row = self.config.fields.iter().map(|f| f.value(cheque));
                group.writer.write_record(row)?;
            }
        }

        self.rows_written += batch.len();
        Ok(batch.len())
    }

    /// Flushes every open file. Returns the data files written so far.
    pub fn update(&mut self) -> Result<Vec<PathBuf>> {
        for group in &mut self.groups {
            group
                .writer
                .flush()
                .map_err(|e| BatchError::fs(&group.path, e))?;
        }
        Ok(self.groups.iter().map(|g| g.path.clone()).collect())
    }

    /// Ends the lifetime.
    ///
    /// Every handle is flushed and dropped even if one flush fails; the first
    /// failure is returned after all handles are released and no control
    /// file is written in that case.
    pub fn close(&mut self) -> Result<WriterSummary> {
        let groups = std::mem::take(&mut self.groups);
        let first = self
            .first_group
            .take()
            .and_then(|slot| groups.get(slot))
            .map(|g| (g.key, g.lot));
        self.index.clear();
        self.is_open = false;

        let mut summary = WriterSummary {
            rows_written: std::mem::take(&mut self.rows_written),
            ..Default::default()
        };
        let mut first_error = None;

        for mut group in groups {
            if let Err(e) = group.writer.flush() {
                first_error.get_or_insert(BatchError::fs(&group.path, e));
            }
            summary.data_files.push(group.path);
        }
        if let Some(error) = first_error {
            return Err(error);
        }

        if let (Some(template), Some((key, Some(lot)))) = (&self.config.control_name, first) {
            let path = self.write_control_file(template, key, lot)?;
            summary.control_file = Some(path);
        }

        Ok(summary)
    }

    fn group_for(&mut self, key: LotKey) -> Result<usize> {
        if let Some(slot) = self.index.get(&key) {
            return Ok(*slot);
        }

        let lot = match (&self.sequence, self.config.sequenced) {
            (Some(sequence), true) => Some(sequence.allocate()),
            _ => None,
        };
        let name = self.config.data_name.render(&NameParts {
            bank: Some(key.beneficiary_bank),
            lot,
            operation_type: Some(key.operation_type),
            stamp: None,
        })?;
        let path = self.output_dir.join(name);

        let file = File::create(&path).map_err(|e| BatchError::fs(&path, e))?;
        let mut writer = self.csv_writer(file);
        writer.write_record(self.config.fields.iter().map(|f| f.name()))?;

        info!(file = %path.display(), ?lot, "Opened group file");
        let slot = self.groups.len();
        self.groups.push(OpenGroup {
            key,
            lot,
            path,
            writer,
        });
        self.index.insert(key, slot);
        if self.first_group.is_none() {
            self.first_group = Some(slot);
        }
        Ok(slot)
    }

    fn write_control_file(&self, template: &NameTemplate, key: LotKey, lot: u32) -> Result<PathBuf> {
        let stamp = chrono::Local::now().format("%Y%m%d%H").to_string();
        let name = template.render(&NameParts {
            bank: Some(key.beneficiary_bank),
            lot: Some(lot),
            operation_type: Some(key.operation_type),
            stamp: Some(stamp),
        })?;
        let path = self.output_dir.join(name);

        let file = File::create(&path).map_err(|e| BatchError::fs(&path, e))?;
        let mut writer = self.csv_writer(file);
        writer.write_record(CONTROL_HEADER)?;
        writer.write_record([
            CONTROL_COMMAND.to_string(),
            format!("{:03}", lot),
            format!("{:03}", key.operation_type),
        ])?;
        writer.flush().map_err(|e| BatchError::fs(&path, e))?;

        debug!(file = %path.display(), "Wrote control file");
        Ok(path)
    }

    fn csv_writer(&self, file: File) -> csv::Writer<File> {
        csv::WriterBuilder::new()
            .delimiter(self.config.delimiter)
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cheque::sample_record;
    use std::path::Path;
    use tempfile::tempdir;

    fn cheques(rows: &[(u64, u16, u16)]) -> Vec<Cheque> {
        rows.iter()
            .map(|(id, bank, op)| Cheque::new(*id, sample_record(&id.to_string(), *bank, *op)))
            .collect()
    }

    fn files_with_extension(dir: &Path, ext: &str) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(ext))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_groups_share_files_across_batches() {
        let dir = tempdir().unwrap();
        let mut writer = GroupedFileWriter::lot(dir.path(), LotSequence::default());
        writer.open().unwrap();

        writer.write(&cheques(&[(1, 12, 3), (2, 7, 1), (3, 12, 3)])).unwrap();
        writer.write(&cheques(&[(4, 12, 3), (5, 7, 1)])).unwrap();
        let summary = writer.close().unwrap();

        assert_eq!(summary.rows_written, 5);
        assert_eq!(
            files_with_extension(dir.path(), ".LOT"),
            vec!["007.000.002.001.LOT", "012.000.001.003.LOT"]
        );

        let content = fs::read_to_string(dir.path().join("012.000.001.003.LOT")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "rio.operation_type.beneficiary_rib.beneficiary_bank.cheque_number.sender_rib.sender_bank.amount"
        );
        assert_eq!(
            content.matches("rio.operation_type").count(),
            1,
            "header must appear once"
        );
        assert_eq!(lines[1], "R1.3.00799999000123456789.12.1.00100111000987654321.1.150000");
    }

    #[test]
    fn test_control_file_describes_first_group() {
        let dir = tempdir().unwrap();
        let mut writer = GroupedFileWriter::lot(dir.path(), LotSequence::new(41).unwrap());
        writer.open().unwrap();
        writer.write(&cheques(&[(1, 12, 3), (2, 7, 1)])).unwrap();
        let summary = writer.close().unwrap();

        let control = summary.control_file.unwrap();
        let name = control.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("012.041."), "unexpected name {}", name);
        assert!(name.ends_with(".ORD"));
        // BBB.SSS.YYYYMMDDHH.ORD
        assert_eq!(name.len(), "012.041.2025010112.ORD".len());

        let content = fs::read_to_string(&control).unwrap();
        assert_eq!(
            content,
            "command_type.lot_number.operation_type\nINLOT.041.003\n"
        );
        assert_eq!(files_with_extension(dir.path(), ".ORD").len(), 1);
    }

    #[test]
    fn test_no_groups_means_no_control_file() {
        let dir = tempdir().unwrap();
        let mut writer = GroupedFileWriter::lot(dir.path(), LotSequence::default());
        writer.open().unwrap();
        assert_eq!(writer.write(&[]).unwrap(), 0);
        let summary = writer.close().unwrap();

        assert!(summary.control_file.is_none());
        assert!(summary.data_files.is_empty());
        assert!(files_with_extension(dir.path(), ".ORD").is_empty());
    }

    #[test]
    fn test_reopen_resets_groups_but_not_sequence() {
        let dir = tempdir().unwrap();
        let sequence = LotSequence::default();
        let mut writer = GroupedFileWriter::lot(dir.path(), sequence.clone());

        writer.open().unwrap();
        writer.write(&cheques(&[(1, 12, 3)])).unwrap();
        let first = writer.close().unwrap();

        writer.open().unwrap();
        writer.write(&cheques(&[(2, 12, 3)])).unwrap();
        let second = writer.close().unwrap();

        assert_eq!(first.data_files[0].file_name().unwrap(), "012.000.001.003.LOT");
        assert_eq!(second.data_files[0].file_name().unwrap(), "012.000.002.003.LOT");
        assert!(second.control_file.unwrap().to_string_lossy().contains("012.002."));
        assert_eq!(sequence.peek(), 3);
    }

    #[test]
    fn test_write_before_open_fails() {
        let dir = tempdir().unwrap();
        let mut writer = GroupedFileWriter::lot(dir.path(), LotSequence::default());
        assert!(writer.write(&cheques(&[(1, 12, 3)])).is_err());
    }

    #[test]
    fn test_reconciliation_writer_has_static_names_and_no_control() {
        let dir = tempdir().unwrap();
        let mut writer =
            GroupedFileWriter::new(WriterConfig::reconciliation("CRA"), dir.path(), None).unwrap();
        writer.open().unwrap();
        writer.write(&cheques(&[(1, 12, 3), (2, 12, 3), (3, 5, 2)])).unwrap();
        let summary = writer.close().unwrap();

        assert!(summary.control_file.is_none());
        assert_eq!(
            files_with_extension(dir.path(), ".CRA"),
            vec!["005.002.CRA", "012.003.CRA"]
        );
    }

    #[test]
    fn test_sequenced_config_requires_sequence() {
        let dir = tempdir().unwrap();
        assert!(GroupedFileWriter::new(WriterConfig::lot(), dir.path(), None).is_err());
    }
}
