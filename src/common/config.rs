//! Configuration file handling
//!
//! The harness reads `harness.toml` (or an explicit `--config` path) and then
//! applies environment overrides. Every field has a default matching the
//! layout of the integration-test directory, so an empty file is valid.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::paths::config_path;
use super::{Error, Result};

/// Environment variable holding the required driver version
pub const ENV_DRIVER_VERSION: &str = "WEBDRIVER_VERSION";
/// Environment variable holding the host application binary
pub const ENV_APP_LOCATION: &str = "OBSIDIAN_LOCATION";
/// Environment variable overriding the working directory root
pub const ENV_WORKDIR: &str = "HARNESS_WORKDIR";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory that relative paths are resolved against
    ///
    /// Read from a file, it is taken relative to that file's directory.
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,

    /// Automation driver settings
    #[serde(default)]
    pub driver: DriverConfig,

    /// Host application settings
    #[serde(default)]
    pub app: AppConfig,

    /// Vault fixture settings
    #[serde(default)]
    pub vault: VaultConfig,

    /// Remote store settings
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Screenshot and log output
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workdir: default_workdir(),
            driver: DriverConfig::default(),
            app: AppConfig::default(),
            vault: VaultConfig::default(),
            remote: RemoteConfig::default(),
            artifacts: ArtifactsConfig::default(),
        }
    }
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".")
}

/// Automation driver settings
#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    /// Version prefix to provision; `WEBDRIVER_VERSION` wins when set
    #[serde(default)]
    pub version: Option<String>,

    /// Version index listing downloads per version and platform
    #[serde(default = "default_index_url")]
    pub index_url: String,

    /// Where provisioned drivers are cached (defaults to the temp dir)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Seconds to wait for the driver service to answer `/status`
    #[serde(default = "default_driver_startup")]
    pub startup_secs: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            version: None,
            index_url: default_index_url(),
            cache_dir: None,
            startup_secs: default_driver_startup(),
        }
    }
}

fn default_index_url() -> String {
    "https://googlechromelabs.github.io/chrome-for-testing/known-good-versions-with-downloads.json"
        .to_string()
}
fn default_driver_startup() -> u64 {
    10
}

/// Host application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Application binary; `OBSIDIAN_LOCATION` wins when set
    #[serde(default)]
    pub binary: Option<PathBuf>,

    /// Plugin id as registered with the application
    #[serde(default = "default_plugin_id")]
    pub plugin_id: String,

    /// Build output of the plugin under test
    #[serde(default = "default_plugin_dist")]
    pub plugin_dist: PathBuf,

    /// Title of the plugin's entry in the settings navigation
    #[serde(default = "default_settings_title")]
    pub settings_title: String,

    /// Script evaluation timeout in milliseconds
    #[serde(default = "default_short_timeout")]
    pub script_timeout_ms: u64,

    /// Implicit element wait in milliseconds
    #[serde(default = "default_short_timeout")]
    pub implicit_wait_ms: u64,

    /// Settle delay after UI transitions in milliseconds
    #[serde(default = "default_settle")]
    pub settle_ms: u64,

    /// How long to wait for a notice after a sync action
    #[serde(default = "default_notice_timeout")]
    pub notice_timeout_ms: u64,

    /// How long the launcher may take to hand over to the vault window
    #[serde(default = "default_bootstrap_timeout")]
    pub bootstrap_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            binary: None,
            plugin_id: default_plugin_id(),
            plugin_dist: default_plugin_dist(),
            settings_title: default_settings_title(),
            script_timeout_ms: default_short_timeout(),
            implicit_wait_ms: default_short_timeout(),
            settle_ms: default_settle(),
            notice_timeout_ms: default_notice_timeout(),
            bootstrap_timeout_ms: default_bootstrap_timeout(),
        }
    }
}

fn default_plugin_id() -> String {
    "obsidian-webdav-sync".to_string()
}
fn default_plugin_dist() -> PathBuf {
    PathBuf::from("../dist/obsidian-webdav-sync")
}
fn default_settings_title() -> String {
    "WebDAV sync".to_string()
}
// Two seconds: the app is local and fast, so anything slower is a real failure.
fn default_short_timeout() -> u64 {
    2_000
}
fn default_settle() -> u64 {
    1_000
}
fn default_notice_timeout() -> u64 {
    5_000
}
fn default_bootstrap_timeout() -> u64 {
    5_000
}

/// Vault fixture settings
#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    /// Template tree copied into every fresh vault
    #[serde(default = "default_template")]
    pub template: PathBuf,

    /// Where the vault is created for a test run
    #[serde(default = "default_vault_path")]
    pub path: PathBuf,

    /// Name typed into the "create vault" flow
    #[serde(default = "default_vault_name")]
    pub name: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            template: default_template(),
            path: default_vault_path(),
            name: default_vault_name(),
        }
    }
}

fn default_template() -> PathBuf {
    PathBuf::from("./test-vaults/trans-rights-are-human-rights")
}
fn default_vault_path() -> PathBuf {
    PathBuf::from("./test_vault")
}
fn default_vault_name() -> String {
    "trans-rights-are-human-rights".to_string()
}

/// A named share exposed by the remote server
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ShareConfig {
    /// Short name used by scenarios
    pub name: String,
    /// Offset under the data directory (and URL path)
    pub path: String,
}

/// Remote store settings
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Server executable, looked up on PATH
    #[serde(default = "default_server_program")]
    pub program: String,

    /// Fixed configuration file handed to the server
    #[serde(default = "default_server_config")]
    pub config_file: PathBuf,

    /// Server data directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Server cache directory
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Base URL the server listens on
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// How long to let the process start before checking it is alive
    #[serde(default = "default_startup_grace")]
    pub startup_grace_ms: u64,

    /// Upper bound on waiting for the process after a kill
    #[serde(default = "default_kill_wait")]
    pub kill_wait_ms: u64,

    /// Shares defined in the server configuration file
    #[serde(default = "default_shares")]
    pub shares: Vec<ShareConfig>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            program: default_server_program(),
            config_file: default_server_config(),
            data_dir: default_data_dir(),
            cache_dir: default_cache_dir(),
            base_url: default_base_url(),
            startup_grace_ms: default_startup_grace(),
            kill_wait_ms: default_kill_wait(),
            shares: default_shares(),
        }
    }
}

fn default_server_program() -> String {
    "copyparty".to_string()
}
fn default_server_config() -> PathBuf {
    PathBuf::from("./copyparty.conf")
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./copyparty")
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("./copyparty-cache")
}
fn default_base_url() -> String {
    "http://localhost:62169".to_string()
}
fn default_startup_grace() -> u64 {
    2_000
}
fn default_kill_wait() -> u64 {
    1_000
}
fn default_shares() -> Vec<ShareConfig> {
    vec![
        ShareConfig {
            name: "root".to_string(),
            path: "vault".to_string(),
        },
        ShareConfig {
            name: "subfolder".to_string(),
            path: "vault/subfolder".to_string(),
        },
        ShareConfig {
            name: "private_subfolder".to_string(),
            path: "vault/private_subfolder".to_string(),
        },
    ]
}

/// Screenshot and log output
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    /// Directory for screenshots and run logs
    #[serde(default = "default_artifacts_dir")]
    pub dir: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: default_artifacts_dir(),
        }
    }
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("./artifacts")
}

impl Config {
    /// Load configuration and apply environment overrides
    ///
    /// Lookup order: the explicit path, `./harness.toml`, the platform config
    /// dir. Returns the defaults when none of them exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let local = PathBuf::from("harness.toml");
                if local.exists() {
                    Self::from_file(&local)?
                } else {
                    match config_path() {
                        Some(path) if path.exists() => Self::from_file(&path)?,
                        _ => Self::default(),
                    }
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a configuration file, anchoring `workdir` at its directory
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let mut config = Self::from_toml(&content)?;
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        config.workdir = if config.workdir == Path::new(".") {
            base.to_path_buf()
        } else {
            base.join(&config.workdir)
        };
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Apply environment overrides through a lookup function
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(version) = lookup(ENV_DRIVER_VERSION).filter(|v| !v.is_empty()) {
            self.driver.version = Some(version);
        }
        if let Some(binary) = lookup(ENV_APP_LOCATION).filter(|v| !v.is_empty()) {
            self.app.binary = Some(PathBuf::from(binary));
        }
        if let Some(workdir) = lookup(ENV_WORKDIR).filter(|v| !v.is_empty()) {
            self.workdir = PathBuf::from(workdir);
        }
    }

    /// Resolve a configured path against the working directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        }
    }

    /// The required driver version
    pub fn driver_version(&self) -> Result<String> {
        self.driver
            .version
            .clone()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "No driver version configured. Set {} or [driver].version",
                    ENV_DRIVER_VERSION
                ))
            })
    }

    /// The host application binary, falling back to the platform default
    pub fn app_binary(&self) -> PathBuf {
        self.app
            .binary
            .clone()
            .unwrap_or_else(default_app_binary)
    }
}

#[cfg(target_os = "windows")]
fn default_app_binary() -> PathBuf {
    std::env::var("LOCALAPPDATA")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("Obsidian")
        .join("Obsidian.exe")
}

#[cfg(target_os = "macos")]
fn default_app_binary() -> PathBuf {
    PathBuf::from("/Applications/Obsidian.app/Contents/MacOS/Obsidian")
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn default_app_binary() -> PathBuf {
    PathBuf::from("/usr/bin/obsidian")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.app.script_timeout_ms, 2_000);
        assert_eq!(config.remote.base_url, "http://localhost:62169");
        assert_eq!(config.remote.shares.len(), 3);
        assert_eq!(config.remote.shares[2].path, "vault/private_subfolder");
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml(
            r#"
[remote]
base_url = "http://127.0.0.1:9999"

[app]
settle_ms = 250
"#,
        )
        .unwrap();
        assert_eq!(config.remote.base_url, "http://127.0.0.1:9999");
        assert_eq!(config.remote.program, "copyparty");
        assert_eq!(config.app.settle_ms, 250);
        assert_eq!(config.app.implicit_wait_ms, 2_000);
    }

    #[test]
    fn test_invalid_toml_is_config_parse() {
        let err = Config::from_toml("[remote\nbase_url = 1").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            ENV_DRIVER_VERSION => Some("137.0".to_string()),
            ENV_APP_LOCATION => Some("/opt/obsidian/obsidian".to_string()),
            ENV_WORKDIR => Some("/srv/it".to_string()),
            _ => None,
        });
        assert_eq!(config.driver_version().unwrap(), "137.0");
        assert_eq!(config.app_binary(), PathBuf::from("/opt/obsidian/obsidian"));
        assert_eq!(
            config.resolve(Path::new("./copyparty")),
            PathBuf::from("/srv/it/./copyparty")
        );
    }

    #[test]
    fn test_missing_driver_version() {
        let mut config = Config::default();
        config.apply_env(|key| (key == ENV_DRIVER_VERSION).then(String::new));
        assert!(matches!(config.driver_version(), Err(Error::Config(_))));
    }

    #[test]
    fn test_file_paths_resolve_next_to_the_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("integration");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("harness.toml");

        std::fs::write(&file, "[vault]\npath = \"./test_vault\"\n").unwrap();
        let config = Config::from_file(&file).unwrap();
        assert_eq!(config.workdir, dir);
        assert_eq!(
            config.resolve(&config.vault.path),
            dir.join("./test_vault")
        );

        std::fs::write(&file, "workdir = \"run\"\n").unwrap();
        assert_eq!(Config::from_file(&file).unwrap().workdir, dir.join("run"));

        let absolute = tmp.path().join("elsewhere");
        std::fs::write(
            &file,
            format!("workdir = \"{}\"\n", absolute.display().to_string().replace('\\', "/")),
        )
        .unwrap();
        assert_eq!(Config::from_file(&file).unwrap().workdir, absolute);
    }
}
