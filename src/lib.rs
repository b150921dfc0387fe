//! Sync harness - end-to-end verification for the WebDAV sync plugin
//!
//! This library provisions an automation driver, brings up a throwaway vault
//! and WebDAV server, drives the desktop application, and checks the result
//! of each sync against both trees.

pub mod app;
pub mod bridge;
pub mod cli;
pub mod commands;
pub mod common;
pub mod fixtures;
pub mod oracle;
pub mod setup;
pub mod testing;
pub mod webdriver;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use oracle::SyncDirection;
