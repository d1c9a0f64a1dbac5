//! Domain layer: cheque records, lot numbering, run status types and the
//! ports implemented by infrastructure.

pub mod cheque;
pub mod lot;
pub mod ports;
pub mod run;
