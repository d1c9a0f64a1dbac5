use crate::domain::cheque::{Cheque, ChequeRecord, ChequeStatus};
use crate::error::{BatchError, Result};
use std::collections::HashSet;

/// Maximum edit distance accepted when matching a column name to a field.
pub const FIELD_DISTANCE_LIMIT: usize = 2;

pub const DELIMITER: u8 = b'.';

/// A column of the period-delimited cheque files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Reference,
    OperationType,
    BeneficiaryRib,
    BeneficiaryBank,
    ChequeNumber,
    SenderRib,
    SenderBank,
    Amount,
    Status,
}

impl Field {
    pub const ALL: [Field; 9] = [
        Field::Reference,
        Field::OperationType,
        Field::BeneficiaryRib,
        Field::BeneficiaryBank,
        Field::ChequeNumber,
        Field::SenderRib,
        Field::SenderBank,
        Field::Amount,
        Field::Status,
    ];

    /// Column order of lot and reconciliation files.
    pub const OUTPUT: [Field; 8] = [
        Field::Reference,
        Field::OperationType,
        Field::BeneficiaryRib,
        Field::BeneficiaryBank,
        Field::ChequeNumber,
        Field::SenderRib,
        Field::SenderBank,
        Field::Amount,
    ];

    const REQUIRED: [Field; 6] = [
        Field::BeneficiaryRib,
        Field::BeneficiaryBank,
        Field::ChequeNumber,
        Field::SenderRib,
        Field::SenderBank,
        Field::Amount,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Reference => "rio",
            Field::OperationType => "operation_type",
            Field::BeneficiaryRib => "beneficiary_rib",
            Field::BeneficiaryBank => "beneficiary_bank",
            Field::ChequeNumber => "cheque_number",
            Field::SenderRib => "sender_rib",
            Field::SenderBank => "sender_bank",
            Field::Amount => "amount",
            Field::Status => "status",
        }
    }

    /// Resolves a column name to a field.
    ///
    /// An exact (case-insensitive) match wins; otherwise the single closest
    /// field within [`FIELD_DISTANCE_LIMIT`] edits is used. Ties are
    /// ambiguous and resolve to nothing.
    pub fn resolve(name: &str) -> Option<Field> {
        let name = name.trim().to_ascii_lowercase();
        if let Some(field) = Field::ALL.iter().find(|f| f.name() == name) {
            return Some(*field);
        }

        let mut best: Option<(usize, Field)> = None;
        let mut tied = false;
        for field in Field::ALL {
            let distance = levenshtein(&name, field.name());
            if distance > FIELD_DISTANCE_LIMIT {
                continue;
            }
            match best {
                Some((d, _)) if distance == d => tied = true,
                Some((d, _)) if distance > d => {}
                _ => {
                    best = Some((distance, field));
                    tied = false;
                }
            }
        }

        if tied { None } else { best.map(|(_, f)| f) }
    }

    /// Renders this column of a cheque for output.
    pub fn value(&self, cheque: &Cheque) -> String {
        let record = &cheque.record;
        match self {
            Field::Reference => record.reference.clone().unwrap_or_default(),
            Field::OperationType => record.operation_type.to_string(),
            Field::BeneficiaryRib => record.beneficiary_rib.clone(),
            Field::BeneficiaryBank => record.beneficiary_bank.to_string(),
            Field::ChequeNumber => record.cheque_number.clone(),
            Field::SenderRib => record.sender_rib.clone(),
            Field::SenderBank => record.sender_bank.to_string(),
            Field::Amount => record.amount.to_string(),
            Field::Status => record.status.to_string(),
        }
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Names of the current layout, in file order.
pub const STANDARD_NAMES: [&str; 8] = [
    "rio",
    "operation_type",
    "beneficiary_rib",
    "beneficiary_bank",
    "cheque_number",
    "sender_rib",
    "sender_bank",
    "amount",
];

/// Names of the older layout, without reference or operation type.
pub const LEGACY_NAMES: [&str; 6] = [
    "beneficiary_rib",
    "beneficiary_bank",
    "cheque_number",
    "sender_rib",
    "sender_bank",
    "amount",
];

/// Column positions of a delimited cheque file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    columns: Vec<Field>,
}

impl ColumnLayout {
    /// Builds a layout from column names given in file order.
    pub fn from_names<'a>(
        names: impl IntoIterator<Item = &'a str>,
        location: &str,
    ) -> Result<Self> {
        let mut columns = Vec::new();
        let mut seen = HashSet::new();

        for name in names {
            let field = Field::resolve(name).ok_or_else(|| {
                BatchError::parse(location, format!("unknown column '{}'", name.trim()))
            })?;
            if !seen.insert(field) {
                return Err(BatchError::parse(
                    location,
                    format!("column '{}' appears twice", field.name()),
                ));
            }
            columns.push(field);
        }

        if let Some(missing) = Field::REQUIRED.iter().find(|f| !seen.contains(f)) {
            return Err(BatchError::parse(
                location,
                format!("missing column '{}'", missing.name()),
            ));
        }

        Ok(Self { columns })
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Maps one data line onto a record.
    pub fn parse_record(&self, row: &csv::StringRecord, location: &str) -> Result<ChequeRecord> {
        if row.len() != self.columns.len() {
            return Err(BatchError::parse(
                location,
                format!("expected {} fields, found {}", self.columns.len(), row.len()),
            ));
        }

        let mut builder = RecordBuilder::default();
        for (field, raw) in self.columns.iter().zip(row.iter()) {
            builder.set(*field, raw.trim(), location)?;
        }
        builder.build(location)
    }
}

/// The fixed layouts a file line may follow, chosen by its field count.
#[derive(Debug, Clone)]
pub struct FixedLayouts {
    legacy: ColumnLayout,
    standard: ColumnLayout,
    with_status: ColumnLayout,
}

impl FixedLayouts {
    pub fn new() -> Result<Self> {
        let location = "fixed layout";
        Ok(Self {
            legacy: ColumnLayout::from_names(LEGACY_NAMES, location)?,
            standard: ColumnLayout::from_names(STANDARD_NAMES, location)?,
            with_status: ColumnLayout::from_names(
                STANDARD_NAMES.into_iter().chain([Field::Status.name()]),
                location,
            )?,
        })
    }

    /// Maps one data line onto a record using the layout of its width.
    pub fn parse_record(&self, row: &csv::StringRecord, location: &str) -> Result<ChequeRecord> {
        let layout = [&self.legacy, &self.standard, &self.with_status]
            .into_iter()
            .find(|l| l.width() == row.len())
            .ok_or_else(|| {
                BatchError::parse(
                    location,
                    format!(
                        "expected {}, {} or {} fields, found {}",
                        self.legacy.width(),
                        self.standard.width(),
                        self.with_status.width(),
                        row.len()
                    ),
                )
            })?;
        layout.parse_record(row, location)
    }
}

#[derive(Default)]
struct RecordBuilder {
    reference: Option<String>,
    operation_type: Option<u16>,
    beneficiary_rib: Option<String>,
    beneficiary_bank: Option<u16>,
    cheque_number: Option<String>,
    sender_rib: Option<String>,
    sender_bank: Option<u16>,
    amount: Option<i64>,
    status: ChequeStatus,
}

impl RecordBuilder {
    fn set(&mut self, field: Field, raw: &str, location: &str) -> Result<()> {
        let text = || (!raw.is_empty()).then(|| raw.to_string());
        match field {
            Field::Reference => self.reference = text(),
            Field::OperationType => self.operation_type = parse_number(field, raw, location)?,
            Field::BeneficiaryRib => self.beneficiary_rib = text(),
            Field::BeneficiaryBank => self.beneficiary_bank = parse_number(field, raw, location)?,
            Field::ChequeNumber => self.cheque_number = text(),
            Field::SenderRib => self.sender_rib = text(),
            Field::SenderBank => self.sender_bank = parse_number(field, raw, location)?,
            Field::Amount => self.amount = parse_number(field, raw, location)?,
            Field::Status => {
                self.status = ChequeStatus::parse_or_default(raw)
                    .map_err(|_| BatchError::parse(location, format!("unknown status '{}'", raw)))?
            }
        }
        Ok(())
    }

    fn build(self, location: &str) -> Result<ChequeRecord> {
        let missing = |field: Field| BatchError::parse(location, format!("{} is blank", field.name()));
        Ok(ChequeRecord {
            reference: self.reference,
            operation_type: self.operation_type.unwrap_or(0),
            beneficiary_rib: self
                .beneficiary_rib
                .ok_or_else(|| missing(Field::BeneficiaryRib))?,
            beneficiary_bank: self
                .beneficiary_bank
                .ok_or_else(|| missing(Field::BeneficiaryBank))?,
            cheque_number: self
                .cheque_number
                .ok_or_else(|| missing(Field::ChequeNumber))?,
            sender_rib: self.sender_rib.ok_or_else(|| missing(Field::SenderRib))?,
            sender_bank: self.sender_bank.ok_or_else(|| missing(Field::SenderBank))?,
            amount: self.amount.ok_or_else(|| missing(Field::Amount))?,
            status: self.status,
        })
    }
}

fn parse_number<T: std::str::FromStr>(field: Field, raw: &str, location: &str) -> Result<Option<T>> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>().map(Some).map_err(|_| {
        BatchError::parse(
            location,
            format!("{} '{}' is not a valid number", field.name(), raw),
        )
    })
}
