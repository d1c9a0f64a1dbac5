use crate::error::{BatchError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a cheque record.
///
/// The variants are declared in lifecycle order so that `Ord` reflects
/// progress: `Pending < Submitted < Integrated < Processed`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ChequeStatus {
    #[default]
    Pending,
    Submitted,
    Integrated,
    Processed,
}

impl ChequeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChequeStatus::Pending => "pending",
            ChequeStatus::Submitted => "submitted",
            ChequeStatus::Integrated => "integrated",
            ChequeStatus::Processed => "processed",
        }
    }

    /// Returns the target status if moving there is a forward transition.
    ///
    /// Staying in place or moving backward is rejected.
    pub fn advance_to(self, target: ChequeStatus) -> Result<ChequeStatus> {
        if target > self {
            Ok(target)
        } else {
            Err(BatchError::InvalidTransition {
                from: self,
                to: target,
            })
        }
    }

    /// Parses a status column, treating a blank value as `Pending`.
    pub fn parse_or_default(raw: &str) -> Result<ChequeStatus> {
        if raw.trim().is_empty() {
            Ok(ChequeStatus::Pending)
        } else {
            raw.parse()
        }
    }
}

impl fmt::Display for ChequeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChequeStatus {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ChequeStatus::Pending),
            "submitted" => Ok(ChequeStatus::Submitted),
            "integrated" => Ok(ChequeStatus::Integrated),
            "processed" => Ok(ChequeStatus::Processed),
            other => Err(BatchError::parse(
                "status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

/// A cheque as read from a remittance or reconciliation file, before it has
/// been given a storage identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChequeRecord {
    /// Operation reference code (`rio`). Absent in older file layouts.
    pub reference: Option<String>,
    pub operation_type: u16,
    pub beneficiary_rib: String,
    pub beneficiary_bank: u16,
    pub cheque_number: String,
    pub sender_rib: String,
    pub sender_bank: u16,
    /// Amount in minor currency units.
    pub amount: i64,
    pub status: ChequeStatus,
}

impl ChequeRecord {
    pub fn lot_key(&self) -> LotKey {
        LotKey {
            beneficiary_bank: self.beneficiary_bank,
            operation_type: self.operation_type,
        }
    }

    pub fn composite_key(&self) -> CompositeKey {
        CompositeKey {
            reference: self.reference.clone(),
            operation_type: self.operation_type,
            beneficiary_rib: self.beneficiary_rib.clone(),
            beneficiary_bank: self.beneficiary_bank,
            cheque_number: self.cheque_number.clone(),
            sender_rib: self.sender_rib.clone(),
            sender_bank: self.sender_bank,
            amount: self.amount,
        }
    }
}

/// A persisted cheque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cheque {
    pub id: u64,
    #[serde(flatten)]
    pub record: ChequeRecord,
}

impl Cheque {
    pub fn new(id: u64, record: ChequeRecord) -> Self {
        Self { id, record }
    }

    pub fn status(&self) -> ChequeStatus {
        self.record.status
    }
}

/// Grouping key of a lot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LotKey {
    pub beneficiary_bank: u16,
    pub operation_type: u16,
}

/// Business key used to match reconciliation entries back to stored cheques.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    pub reference: Option<String>,
    pub operation_type: u16,
    pub beneficiary_rib: String,
    pub beneficiary_bank: u16,
    pub cheque_number: String,
    pub sender_rib: String,
    pub sender_bank: u16,
    pub amount: i64,
}

impl CompositeKey {
    pub fn matches(&self, record: &ChequeRecord) -> bool {
        self.cheque_number == record.cheque_number
            && self.reference == record.reference
            && self.operation_type == record.operation_type
            && self.beneficiary_rib == record.beneficiary_rib
            && self.beneficiary_bank == record.beneficiary_bank
            && self.sender_rib == record.sender_rib
            && self.sender_bank == record.sender_bank
            && self.amount == record.amount
    }
}

#[cfg(test)]
pub(crate) fn sample_record(cheque_number: &str, bank: u16, op: u16) -> ChequeRecord {
    ChequeRecord {
        reference: Some(format!("R{}", cheque_number)),
        operation_type: op,
        beneficiary_rib: "00799999000123456789".to_string(),
        beneficiary_bank: bank,
        cheque_number: cheque_number.to_string(),
        sender_rib: "00100111000987654321".to_string(),
        sender_bank: 1,
        amount: 150_000,
        status: ChequeStatus::Pending,
    }
}
