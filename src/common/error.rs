//! Error types for the sync harness
//!
//! Variants follow the failure classes a harness run can hit: fatal setup
//! errors (bad environment or a UI regression), oracle assertion failures,
//! and step timeouts. Teardown problems never become an `Error`; the
//! lifecycle code logs and swallows them.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Provisioning Errors ===
    #[error("Driver provisioning failed: {0}")]
    Provision(String),

    // === Fixture Setup Errors ===
    #[error("Build artifact missing at {0}. Build the plugin before running the harness")]
    MissingBuildArtifact(String),

    #[error("Remote server failed to start: {0}")]
    ServerStartFailed(String),

    #[error("Application bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("Driver service failed to start: {0}")]
    DriverStartFailed(String),

    #[error("Could not locate {what} in the application UI")]
    ElementNotFound { what: String },

    // === Session Errors ===
    #[error("Script evaluation timed out after {0} ms")]
    SessionTimeout(u64),

    #[error("WebDriver returned '{error}': {message}")]
    WebDriver { error: String, message: String },

    #[error("Script threw inside the application: {0}")]
    ScriptException(String),

    #[error("Settings injection failed: {0}")]
    Injection(String),

    // === Waits ===
    #[error("Timed out after {millis} ms waiting for {what}")]
    WaitTimeout { what: String, millis: u64 },

    // === Oracle ===
    #[error("Assertion failed: {0}")]
    Assertion(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Network Errors ===
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an element-not-found error
    pub fn element_not_found<S: Into<String>>(what: S) -> Self {
        Self::ElementNotFound { what: what.into() }
    }

    /// Create a WebDriver protocol error
    pub fn webdriver(error: &str, message: &str) -> Self {
        Self::WebDriver {
            error: error.to_string(),
            message: message.to_string(),
        }
    }

    /// Create an oracle assertion failure
    pub fn assertion<S: Into<String>>(message: S) -> Self {
        Self::Assertion(message.into())
    }

    /// Whether this error belongs to the fatal setup class.
    ///
    /// Setup errors point at a misconfigured environment or a changed
    /// application UI and are never retried.
    pub fn is_fatal_setup(&self) -> bool {
        matches!(
            self,
            Error::Provision(_)
                | Error::MissingBuildArtifact(_)
                | Error::ServerStartFailed(_)
                | Error::Bootstrap(_)
                | Error::DriverStartFailed(_)
                | Error::ElementNotFound { .. }
        )
    }

    /// Whether this error is an oracle mismatch rather than a harness fault
    pub fn is_assertion(&self) -> bool {
        matches!(self, Error::Assertion(_))
    }

    /// Whether the WebDriver reported that the current window is gone
    pub fn is_no_such_window(&self) -> bool {
        matches!(self, Error::WebDriver { error, .. } if error == "no such window")
    }

    /// The element was detached from the page after it was found
    pub fn is_stale_element(&self) -> bool {
        matches!(self, Error::WebDriver { error, .. } if error == "stale element reference")
    }
}
