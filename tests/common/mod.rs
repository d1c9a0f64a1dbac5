#![allow(dead_code)]

use chequelot::config::BatchConfig;
use rand::Rng;
use std::fs::File;
use std::io::Error;
use std::path::Path;

pub const HEADER: [&str; 8] = [
    "rio",
    "operation_type",
    "beneficiary_rib",
    "beneficiary_bank",
    "cheque_number",
    "sender_rib",
    "sender_bank",
    "amount",
];

/// One generated remittance line.
#[derive(Debug, Clone)]
pub struct Line {
    pub cheque_number: String,
    pub bank: u16,
    pub operation_type: u16,
    pub amount: i64,
}

impl Line {
    pub fn new(cheque_number: impl Into<String>, bank: u16, operation_type: u16) -> Self {
        Self {
            cheque_number: cheque_number.into(),
            bank,
            operation_type,
            amount: rand::thread_rng().gen_range(100..10_000_000),
        }
    }

    pub fn fields(&self) -> [String; 8] {
        [
            format!("R{}", self.cheque_number),
            self.operation_type.to_string(),
            "00799999000123456789".to_string(),
            self.bank.to_string(),
            self.cheque_number.clone(),
            "00100111000987654321".to_string(),
            "1".to_string(),
            self.amount.to_string(),
        ]
    }
}

/// Writes a period-delimited remittance file.
pub fn write_remittance(path: &Path, lines: &[Line]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'.')
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(file);

    wtr.write_record(HEADER)?;
    for line in lines {
        wtr.write_record(line.fields())?;
    }
    wtr.flush()?;
    Ok(())
}

/// `count` lines with numbers `{prefix}{n}`, all in the same group.
pub fn generate_lines(prefix: &str, count: usize, bank: u16, operation_type: u16) -> Vec<Line> {
    (1..=count)
        .map(|n| Line::new(format!("{}{}", prefix, n), bank, operation_type))
        .collect()
}

/// Lines spread over random banks and operation types.
pub fn generate_mixed_lines(prefix: &str, count: usize) -> Vec<Line> {
    let mut rng = rand::thread_rng();
    (1..=count)
        .map(|n| {
            Line::new(
                format!("{}{}", prefix, n),
                rng.gen_range(1..=5),
                rng.gen_range(1..=3),
            )
        })
        .collect()
}

/// Configuration rooted in `root` with fast monitor timings.
pub fn test_config(root: &Path) -> BatchConfig {
    let mut config = BatchConfig {
        output_dir: root.join("output"),
        ack_dir: root.join("ord"),
        receipt_dir: root.join("crl"),
        reconciliation_dir: root.join("output"),
        ..Default::default()
    };
    config.monitor.poll_interval_ms = 20;
    config.monitor.completion_timeout_secs = 5;
    config.monitor.ack_timeout_secs = 1;
    config
}

pub fn files_with_suffix(dir: &Path, suffix: &str) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(suffix))
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}
