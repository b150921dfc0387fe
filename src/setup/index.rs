//! Driver version index
//!
//! The index lists every known-good browser build together with per-platform
//! download URLs for each of its companion binaries.

use serde::Deserialize;

use crate::common::{Error, Result};

/// Top-level index document
#[derive(Debug, Clone, Deserialize)]
pub struct VersionIndex {
    pub versions: Vec<VersionEntry>,
}

/// One version in the index
#[derive(Debug, Clone, Deserialize)]
pub struct VersionEntry {
    pub version: String,
    #[serde(default)]
    pub downloads: Downloads,
}

/// Downloads attached to a version, keyed by binary
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Downloads {
    #[serde(default)]
    pub chromedriver: Vec<PlatformDownload>,
}

/// A download for a single platform
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformDownload {
    pub platform: String,
    pub url: String,
}

impl VersionIndex {
    /// Parse an index document
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Provision(format!("Malformed version index: {}", e)))
    }

    /// First entry whose version starts with `prefix`
    ///
    /// Index order is preserved, so a short prefix like `137` resolves to the
    /// oldest listed 137 build.
    pub fn find_version(&self, prefix: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.version.starts_with(prefix))
    }

    /// Resolve the driver download URL for a version prefix and platform tag
    pub fn driver_url(&self, prefix: &str, platform_tag: &str) -> Result<(&str, &str)> {
        let entry = self.find_version(prefix).ok_or_else(|| {
            Error::Provision(format!("Version {} not found in the version index", prefix))
        })?;
        tracing::info!("Matched {} from {}", entry.version, prefix);

        entry
            .downloads
            .chromedriver
            .iter()
            .find(|d| d.platform == platform_tag)
            .map(|d| (entry.version.as_str(), d.url.as_str()))
            .ok_or_else(|| {
                Error::Provision(format!(
                    "Version {} has no driver download for platform {}",
                    entry.version, platform_tag
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"{
        "timestamp": "2025-06-01T00:00:00.000Z",
        "versions": [
            { "version": "113.0.5672.0", "revision": "1", "downloads": {} },
            { "version": "137.0.7151.55", "revision": "2", "downloads": {
                "chrome": [ { "platform": "linux64", "url": "https://example.invalid/chrome.zip" } ],
                "chromedriver": [
                    { "platform": "linux64", "url": "https://example.invalid/137.55/linux64.zip" },
                    { "platform": "win64", "url": "https://example.invalid/137.55/win64.zip" }
                ]
            } },
            { "version": "137.0.7151.68", "revision": "3", "downloads": {
                "chromedriver": [
                    { "platform": "linux64", "url": "https://example.invalid/137.68/linux64.zip" }
                ]
            } }
        ]
    }"#;

    #[test]
    fn test_prefix_matches_first_entry() {
        let index = VersionIndex::parse(INDEX).unwrap();
        let (version, url) = index.driver_url("137", "linux64").unwrap();
        assert_eq!(version, "137.0.7151.55");
        assert_eq!(url, "https://example.invalid/137.55/linux64.zip");
    }

    #[test]
    fn test_exact_version() {
        let index = VersionIndex::parse(INDEX).unwrap();
        let (_, url) = index.driver_url("137.0.7151.68", "linux64").unwrap();
        assert_eq!(url, "https://example.invalid/137.68/linux64.zip");
    }

    #[test]
    fn test_unknown_version() {
        let index = VersionIndex::parse(INDEX).unwrap();
        let err = index.driver_url("999", "linux64").unwrap_err();
        assert!(matches!(err, Error::Provision(msg) if msg.contains("999")));
    }

    #[test]
    fn test_missing_platform() {
        let index = VersionIndex::parse(INDEX).unwrap();
        assert!(index.driver_url("137.0.7151.68", "win64").is_err());
        // Versions without driver downloads don't match any platform
        assert!(index.driver_url("113", "linux64").is_err());
    }

    #[test]
    fn test_malformed_index() {
        assert!(matches!(
            VersionIndex::parse("{\"versions\": 3}"),
            Err(Error::Provision(_))
        ));
    }
}
