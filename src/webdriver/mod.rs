//! Automation backend
//!
//! Drives the host application through a W3C WebDriver service. Nothing
//! above this module depends on WebDriver specifics except the application
//! session, which pairs it with the script bridge.

pub mod client;
pub mod service;
pub mod types;

pub use client::{Session, WebDriverClient};
pub use service::DriverService;
pub use types::{By, Element, Timeouts};
