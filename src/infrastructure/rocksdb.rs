use crate::domain::cheque::{Cheque, ChequeRecord, ChequeStatus, CompositeKey};
use crate::domain::ports::ChequeStore;
use crate::error::{BatchError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for cheque rows keyed by big-endian id.
pub const CF_CHEQUES: &str = "cheques";
/// Column Family enforcing cheque number uniqueness (number -> id).
pub const CF_CHEQUE_NUMBERS: &str = "cheque_numbers";
/// Column Family for store metadata such as the id sequence.
pub const CF_META: &str = "meta";

const LAST_ID_KEY: &[u8] = b"last_id";

/// A persistent cheque store backed by RocksDB.
///
/// Each chunk is committed with a single `WriteBatch`, so a failed chunk
/// leaves no partial rows behind. Writers are serialized through an async
/// mutex; readers go straight to the database.
///
/// `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// the column families on first use.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_CHEQUES, CF_CHEQUE_NUMBERS, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            BatchError::Internal(Box::new(std::io::Error::other(format!(
                "{} column family not found",
                name
            ))))
        })
    }

    fn last_id(&self) -> Result<u64> {
        let meta = self.cf(CF_META)?;
        match self.db.get_cf(meta, LAST_ID_KEY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    BatchError::Internal(Box::new(std::io::Error::other(
                        "corrupt id sequence value",
                    )))
                })?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    fn load(&self, id: u64) -> Result<Option<Cheque>> {
        let cheques = self.cf(CF_CHEQUES)?;
        match self.db.get_cf(cheques, id.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Visits cheques in id order starting at `from_id`, until `visit`
    /// returns false.
    fn scan_from<F>(&self, from_id: u64, mut visit: F) -> Result<()>
    where
        F: FnMut(Cheque) -> bool,
    {
        let cheques = self.cf(CF_CHEQUES)?;
        let start = from_id.to_be_bytes();
        let iter = self
            .db
            .iterator_cf(cheques, IteratorMode::From(&start, Direction::Forward));

        for item in iter {
            let (_key, value) = item?;
            if !visit(decode(&value)?) {
                break;
            }
        }
        Ok(())
    }
}

fn encode(cheque: &Cheque) -> Result<Vec<u8>> {
    serde_json::to_vec(cheque).map_err(|e| {
        BatchError::Internal(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Serialization error: {}", e),
        )))
    })
}

fn decode(bytes: &[u8]) -> Result<Cheque> {
    serde_json::from_slice(bytes).map_err(|e| {
        BatchError::Internal(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Deserialization error: {}", e),
        )))
    })
}

#[async_trait]
impl ChequeStore for RocksDBStore {
    async fn insert_chunk(&self, records: Vec<ChequeRecord>) -> Result<Vec<Cheque>> {
        let _guard = self.write_lock.lock().await;
        let numbers = self.cf(CF_CHEQUE_NUMBERS)?;

        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            let exists = self
                .db
                .get_pinned_cf(numbers, record.cheque_number.as_bytes())?
                .is_some();
            if exists || !seen.insert(record.cheque_number.as_str()) {
                return Err(BatchError::Persistence(format!(
                    "duplicate cheque number {}",
                    record.cheque_number
                )));
            }
        }

        let cheques = self.cf(CF_CHEQUES)?;
        let meta = self.cf(CF_META)?;
        let mut last_id = self.last_id()?;
        let mut batch = WriteBatch::default();
        let mut inserted = Vec::with_capacity(records.len());

        for record in records {
            last_id += 1;
            let cheque = Cheque::new(last_id, record);
            batch.put_cf(cheques, last_id.to_be_bytes(), encode(&cheque)?);
            batch.put_cf(
                numbers,
                cheque.record.cheque_number.as_bytes(),
                last_id.to_be_bytes(),
            );
            inserted.push(cheque);
        }
        batch.put_cf(meta, LAST_ID_KEY, last_id.to_be_bytes());

        self.db
            .write(batch)
            .map_err(|e| BatchError::Persistence(format!("chunk commit failed: {}", e)))?;
        Ok(inserted)
    }

    async fn page_by_status(
        &self,
        status: ChequeStatus,
        after_id: u64,
        limit: usize,
    ) -> Result<Vec<Cheque>> {
        let mut page = Vec::with_capacity(limit);
        if limit == 0 {
            return Ok(page);
        }
        self.scan_from(after_id.saturating_add(1), |cheque| {
            if cheque.status() == status {
                page.push(cheque);
            }
            page.len() < limit
        })?;
        Ok(page)
    }

    async fn advance_chunk(&self, ids: &[u64], target: ChequeStatus) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let cheques = self.cf(CF_CHEQUES)?;
        let mut batch = WriteBatch::default();
        let mut moved = 0;

        for id in ids {
            let mut cheque = self.load(*id)?.ok_or_else(|| {
                BatchError::Persistence(format!("cheque {} does not exist", id))
            })?;
            if cheque.status() < target {
                cheque.record.status = cheque.status().advance_to(target)?;
                batch.put_cf(cheques, id.to_be_bytes(), encode(&cheque)?);
                moved += 1;
            }
        }

        self.db
            .write(batch)
            .map_err(|e| BatchError::Persistence(format!("status update failed: {}", e)))?;
        Ok(moved)
    }

    async fn find_matching(
        &self,
        key: &CompositeKey,
        statuses: &[ChequeStatus],
    ) -> Result<Vec<Cheque>> {
        let numbers = self.cf(CF_CHEQUE_NUMBERS)?;
        // Cheque numbers are unique, so the number index narrows the lookup
        // to at most one row.
        let Some(raw_id) = self.db.get_cf(numbers, key.cheque_number.as_bytes())? else {
            return Ok(Vec::new());
        };
        let raw_id: [u8; 8] = raw_id.as_slice().try_into().map_err(|_| {
            BatchError::Internal(Box::new(std::io::Error::other("corrupt cheque number index")))
        })?;

        Ok(self
            .load(u64::from_be_bytes(raw_id))?
            .into_iter()
            .filter(|cheque| statuses.contains(&cheque.status()) && key.matches(&cheque.record))
            .collect())
    }

    async fn get(&self, id: u64) -> Result<Option<Cheque>> {
        self.load(id)
    }

    async fn count(&self) -> Result<usize> {
        let mut count = 0;
        self.scan_from(0, |_| {
            count += 1;
            true
        })?;
        Ok(count)
    }
}
