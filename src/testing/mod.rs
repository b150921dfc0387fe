//! Scenario runner
//!
//! Reads YAML scenarios and runs their steps against freshly acquired
//! fixtures. Assertions go through the oracle, so failures report
//! structured differences instead of string dumps.

mod config;
mod runner;

pub use config::*;
pub use runner::{run_scenario, TestResult};
