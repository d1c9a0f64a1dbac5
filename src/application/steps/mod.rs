//! The steps of the remittance and reconciliation jobs.

pub mod file_marking;
pub mod ingestion;
pub mod lot_grouping;
pub mod reconciliation;
pub mod status_transition;

pub use file_marking::FileMarkingStep;
pub use ingestion::IngestionStep;
pub use lot_grouping::LotGroupingStep;
pub use reconciliation::{ReconciliationValidateStep, ReconciliationWriteStep};
pub use status_transition::StatusTransitionStep;
