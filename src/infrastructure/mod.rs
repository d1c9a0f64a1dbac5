//! Storage backends implementing [`crate::domain::ports::ChequeStore`].

pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
