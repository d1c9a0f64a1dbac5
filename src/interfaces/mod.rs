pub mod csv;
pub mod files;
