//! Cross-platform cache and configuration paths

use std::io;
use std::path::{Path, PathBuf};

/// Name used for per-user directories
const APP_NAME: &str = "vault-sync-harness";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/vault-sync-harness/`
/// - macOS: `~/Library/Application Support/vault-sync-harness/`
/// - Windows: `%APPDATA%\vault-sync-harness\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Directory that provisioned drivers are cached in
///
/// Shared across runs and checkouts, so it lives under the system temp dir
/// unless the configuration says otherwise.
pub fn driver_cache_dir(configured: Option<&Path>) -> PathBuf {
    configured
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir)
}

/// Cache location for a driver version
pub fn driver_cache_path(cache_dir: &Path, version: &str) -> PathBuf {
    let name = if cfg!(windows) {
        format!("driver-{}.exe", version)
    } else {
        format!("driver-{}", version)
    };
    cache_dir.join(name)
}

/// Directory for one scenario's screenshots
pub fn scenario_artifacts_dir(artifacts: &Path, scenario: &str) -> PathBuf {
    artifacts.join(sanitize(scenario))
}

/// Make a label safe to use as a file name
pub fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Create a directory (and parents) if it does not exist yet
pub fn ensure_dir(dir: &Path) -> io::Result<PathBuf> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_is_valid() {
        let dir = config_dir();
        assert!(dir.is_some());
    }

    #[test]
    fn test_driver_cache_path_is_keyed_by_version() {
        let a = driver_cache_path(Path::new("/tmp"), "137.0.7151");
        let b = driver_cache_path(Path::new("/tmp"), "138.0");
        assert_ne!(a, b);
        assert!(a.to_string_lossy().contains("driver-137.0.7151"));
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("Push wipe blocked"), "Push_wipe_blocked");
        assert_eq!(sanitize("a/b:c"), "a_b_c");
    }
}
