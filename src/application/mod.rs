//! Application layer: the steps, how they are sequenced into jobs, the run
//! registry and the acknowledgment monitor.

pub mod job;
pub mod monitor;
pub mod orchestrator;
pub mod registry;
pub mod step;
pub mod steps;
