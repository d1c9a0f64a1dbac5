use crate::error::{BatchError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

pub const LOT_SEQUENCE_MIN: u32 = 1;
pub const LOT_SEQUENCE_MAX: u32 = 999;

/// Process-wide lot number generator cycling through `1..=999`.
///
/// Clones share the same counter. It is created once when the orchestrator
/// starts and is never reset between job runs, so every lot file gets a
/// distinct number until the counter wraps. A failed run still consumes the
/// numbers it allocated.
#[derive(Debug, Clone)]
pub struct LotSequence {
    next: Arc<AtomicU32>,
}

impl LotSequence {
    pub fn new(start: u32) -> Result<Self> {
        if !(LOT_SEQUENCE_MIN..=LOT_SEQUENCE_MAX).contains(&start) {
            return Err(BatchError::Config(format!(
                "lot sequence start {} outside {}..={}",
                start, LOT_SEQUENCE_MIN, LOT_SEQUENCE_MAX
            )));
        }
        Ok(Self {
            next: Arc::new(AtomicU32::new(start)),
        })
    }

    /// Returns the current value and advances the counter, wrapping 999 to 1.
    pub fn allocate(&self) -> u32 {
        // fetch_update only fails when the closure returns None
        match self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(if current >= LOT_SEQUENCE_MAX {
                    LOT_SEQUENCE_MIN
                } else {
                    current + 1
                })
            }) {
            Ok(previous) | Err(previous) => previous,
        }
    }

    /// The value the next allocation will return.
    pub fn peek(&self) -> u32 {
        self.next.load(Ordering::SeqCst)
    }
}

impl Default for LotSequence {
    fn default() -> Self {
        Self {
            next: Arc::new(AtomicU32::new(LOT_SEQUENCE_MIN)),
        }
    }
}

/// Values available to a [`NameTemplate`].
#[derive(Debug, Clone, Default)]
pub struct NameParts {
    pub bank: Option<u16>,
    pub lot: Option<u32>,
    pub operation_type: Option<u16>,
    pub stamp: Option<String>,
}

/// File name pattern made of period-separated segments.
///
/// Segments may be literals or one of the tokens `{bank}`, `{lot}`, `{op}`
/// (rendered as three zero-padded digits) and `{stamp}`. The extension is
/// appended after a final period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate {
    segments: Vec<String>,
    extension: String,
}

impl NameTemplate {
    pub fn new(pattern: &str, extension: &str) -> Self {
        Self {
            segments: pattern
                .split('.')
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
                .collect(),
            extension: extension.trim().to_string(),
        }
    }

    pub fn render(&self, parts: &NameParts) -> Result<String> {
        if self.segments.is_empty() {
            return Err(BatchError::Config("file name template has no parts".into()));
        }

        let mut rendered = Vec::with_capacity(self.segments.len() + 1);
        for segment in &self.segments {
            let value = match segment.as_str() {
                "{bank}" => parts.bank.map(|b| format!("{:03}", b)),
                "{lot}" => parts.lot.map(|l| format!("{:03}", l)),
                "{op}" => parts.operation_type.map(|o| format!("{:03}", o)),
                "{stamp}" => parts.stamp.clone(),
                literal => Some(literal.to_string()),
            };
            let value = value.ok_or_else(|| {
                BatchError::Config(format!("no value for file name token {}", segment))
            })?;
            rendered.push(value);
        }
        if !self.extension.is_empty() {
            rendered.push(self.extension.clone());
        }

        Ok(rendered.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_allocates_from_start() {
        let seq = LotSequence::new(5).unwrap();
        assert_eq!(seq.allocate(), 5);
        assert_eq!(seq.allocate(), 6);
        assert_eq!(seq.peek(), 7);
    }

    #[test]
    fn test_sequence_wraps_after_999() {
        let seq = LotSequence::new(998).unwrap();
        assert_eq!(seq.allocate(), 998);
        assert_eq!(seq.allocate(), 999);
        assert_eq!(seq.allocate(), 1);
        assert_eq!(seq.allocate(), 2);
    }

    #[test]
    fn test_sequence_matches_closed_form() {
        for start in [1u32, 500, 997] {
            let seq = LotSequence::new(start).unwrap();
            for n in 1..=2000u32 {
                let expected = ((start + n - 1 - 1) % 999) + 1;
                assert_eq!(seq.allocate(), expected, "start={} n={}", start, n);
            }
        }
    }

    #[test]
    fn test_sequence_rejects_out_of_range_start() {
        assert!(LotSequence::new(0).is_err());
        assert!(LotSequence::new(1000).is_err());
    }

    #[test]
    fn test_sequence_clones_share_counter() {
        let seq = LotSequence::default();
        let other = seq.clone();
        assert_eq!(seq.allocate(), 1);
        assert_eq!(other.allocate(), 2);
    }

    #[test]
    fn test_concurrent_allocations_are_distinct() {
        let seq = LotSequence::default();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seq = seq.clone();
                std::thread::spawn(move || (0..100).map(|_| seq.allocate()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 800);
    }

    #[test]
    fn test_lot_name_rendering() {
        let template = NameTemplate::new("{bank}.000.{lot}.{op}", "LOT");
        let name = template
            .render(&NameParts {
                bank: Some(12),
                lot: Some(7),
                operation_type: Some(3),
                stamp: None,
            })
            .unwrap();
        assert_eq!(name, "012.000.007.003.LOT");
    }

    #[test]
    fn test_missing_token_value_is_an_error() {
        let template = NameTemplate::new("{bank}.{lot}.{stamp}", "ORD");
        let result = template.render(&NameParts {
            bank: Some(12),
            lot: Some(1),
            ..Default::default()
        });
        assert!(matches!(result, Err(BatchError::Config(_))));
    }

    #[test]
    fn test_empty_template_is_an_error() {
        let template = NameTemplate::new("", "LOT");
        assert!(template.render(&NameParts::default()).is_err());
    }
}
