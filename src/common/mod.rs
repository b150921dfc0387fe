//! Common utilities shared by every component

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;
pub mod platform;
pub mod wait;

pub use error::{Error, Result};
pub use platform::Platform;
