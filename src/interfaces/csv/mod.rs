//! Period-delimited cheque files: positional reading and grouped writing.

pub mod cheque_reader;
pub mod grouped_writer;
pub mod layout;
