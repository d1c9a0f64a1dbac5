use super::layout::{DELIMITER, FixedLayouts};
use crate::domain::cheque::ChequeRecord;
use crate::error::{BatchError, Result};
use std::io::Read;

/// Reads cheques from a period-delimited remittance or reconciliation file.
///
/// The first line is a header and is skipped whatever it contains. Fields are
/// mapped by position, the layout being chosen by each line's field count
/// (see [`FixedLayouts`]).
pub struct ChequeReader<R: Read> {
    reader: csv::Reader<R>,
    source: String,
}

impl<R: Read> ChequeReader<R> {
    /// Creates a reader. `source` names the input in error messages.
    pub fn new(input: R, source: impl Into<String>) -> Self {
        let reader = csv::ReaderBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(true)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(input);
        Self {
            reader,
            source: source.into(),
        }
    }

    /// Returns an iterator that lazily reads and maps records.
    pub fn records(self) -> ChequeRecords<R> {
        let (layouts, pending_error) = match FixedLayouts::new() {
            Ok(layouts) => (Some(layouts), None),
            Err(e) => (None, Some(e)),
        };

        ChequeRecords {
            rows: self.reader.into_records(),
            layouts,
            pending_error,
            source: self.source,
        }
    }
}

pub struct ChequeRecords<R: Read> {
    rows: csv::StringRecordsIntoIter<R>,
    layouts: Option<FixedLayouts>,
    pending_error: Option<BatchError>,
    source: String,
}

impl<R: Read> Iterator for ChequeRecords<R> {
    type Item = Result<ChequeRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(error) = self.pending_error.take() {
            return Some(Err(error));
        }
        let layouts = self.layouts.as_ref()?;

        loop {
            let row = match self.rows.next()? {
                Ok(row) => row,
                Err(e) => return Some(Err(BatchError::from(e))),
            };
            // Trailing blank lines
            if row.iter().all(|f| f.is_empty()) {
                continue;
            }
            let line = row.position().map_or(0, |p| p.line());
            let location = format!("{}:{}", self.source, line);
            return Some(layouts.parse_record(&row, &location));
        }
    }
}
