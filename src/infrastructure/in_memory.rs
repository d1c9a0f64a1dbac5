use crate::domain::cheque::{Cheque, ChequeRecord, ChequeStatus, CompositeKey};
use crate::domain::ports::ChequeStore;
use crate::error::{BatchError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    cheques: BTreeMap<u64, Cheque>,
    numbers: HashMap<String, u64>,
    last_id: u64,
}

/// A thread-safe in-memory cheque store.
///
/// All mutations of one chunk happen under a single write lock and are
/// validated before anything is applied, which gives chunk-level atomicity.
#[derive(Default, Clone)]
pub struct InMemoryChequeStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryChequeStore {
    /// Creates a new, empty in-memory cheque store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChequeStore for InMemoryChequeStore {
    async fn insert_chunk(&self, records: Vec<ChequeRecord>) -> Result<Vec<Cheque>> {
        let mut tables = self.tables.write().await;

        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if tables.numbers.contains_key(&record.cheque_number)
                || !seen.insert(record.cheque_number.as_str())
            {
                return Err(BatchError::Persistence(format!(
                    "duplicate cheque number {}",
                    record.cheque_number
                )));
            }
        }

        let mut inserted = Vec::with_capacity(records.len());
        for record in records {
            tables.last_id += 1;
            let id = tables.last_id;
            tables.numbers.insert(record.cheque_number.clone(), id);
            let cheque = Cheque::new(id, record);
            tables.cheques.insert(id, cheque.clone());
            inserted.push(cheque);
        }
        Ok(inserted)
    }

    async fn page_by_status(
        &self,
        status: ChequeStatus,
        after_id: u64,
        limit: usize,
    ) -> Result<Vec<Cheque>> {
        let tables = self.tables.read().await;
        Ok(tables
            .cheques
            .range(after_id.saturating_add(1)..)
            .map(|(_, cheque)| cheque)
            .filter(|cheque| cheque.status() == status)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn advance_chunk(&self, ids: &[u64], target: ChequeStatus) -> Result<usize> {
        let mut tables = self.tables.write().await;

        let mut moves = Vec::with_capacity(ids.len());
        for id in ids {
            let cheque = tables.cheques.get(id).ok_or_else(|| {
                BatchError::Persistence(format!("cheque {} does not exist", id))
            })?;
            if cheque.status() < target {
                moves.push((*id, cheque.status().advance_to(target)?));
            }
        }

        for (id, status) in &moves {
            if let Some(cheque) = tables.cheques.get_mut(id) {
                cheque.record.status = *status;
            }
        }
        Ok(moves.len())
    }

    async fn find_matching(
        &self,
        key: &CompositeKey,
        statuses: &[ChequeStatus],
    ) -> Result<Vec<Cheque>> {
        let tables = self.tables.read().await;
        Ok(tables
            .numbers
            .get(&key.cheque_number)
            .and_then(|id| tables.cheques.get(id))
            .filter(|cheque| statuses.contains(&cheque.status()) && key.matches(&cheque.record))
            .cloned()
            .into_iter()
            .collect())
    }

    async fn get(&self, id: u64) -> Result<Option<Cheque>> {
        let tables = self.tables.read().await;
        Ok(tables.cheques.get(&id).cloned())
    }

    async fn count(&self) -> Result<usize> {
        let tables = self.tables.read().await;
        Ok(tables.cheques.len())
    }
}
