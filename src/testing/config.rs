//! Test scenario configuration types
//!
//! Defines the data structures for deserializing YAML test scenarios.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::common::{Error, Result};
use crate::fixtures::FixtureRequest;
use crate::oracle::SyncDirection;

/// A complete test scenario loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct TestScenario {
    /// Name of the test scenario
    pub name: String,
    /// Optional description of what the test verifies
    pub description: Option<String>,
    /// Resources the scenario needs
    #[serde(default)]
    pub fixtures: FixtureRequest,
    /// Platforms the scenario can't run on (`linux`, `macos`, `windows`)
    #[serde(default)]
    pub skip_on: Vec<String>,
    /// The sequence of test steps to execute
    pub steps: Vec<TestStep>,
}

impl TestScenario {
    /// Load a scenario from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read test scenario '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("{} ({})", e, path.display())))
    }

    /// Parse a scenario from YAML
    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse test scenario: {}", e)))
    }
}

/// Which tree a path refers to
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The local vault
    #[default]
    Vault,
    /// The remote root share
    Remote,
}

/// A single test step in the execution flow
#[derive(Deserialize, Debug)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Inject the canonical settings, optionally deep-merged with overrides
    InjectSettings {
        overrides: Option<Value>,
    },
    /// Read the live settings back and compare them
    ExtractSettings {
        /// Expected settings; defaults to whatever was injected last
        expect: Option<Value>,
    },
    /// Create or overwrite a file
    WriteFile {
        #[serde(default)]
        side: Side,
        path: String,
        #[serde(default)]
        content: String,
    },
    /// Delete a file or directory tree
    Remove {
        #[serde(default)]
        side: Side,
        path: String,
    },
    /// Delete everything under a root, leaving the empty root behind
    Wipe {
        side: Side,
    },
    /// Push through the sync modal
    Upload,
    /// Pull through the sync modal
    Download,
    /// Run the connection test from the settings tab
    TestConnection,
    /// Check the notices captured by the last action
    ExpectNotice {
        contains: String,
        /// Exact number of matching notices (default: at least one)
        count: Option<usize>,
    },
    /// Exactly one notice, containing the text
    ExpectSingleNotice {
        contains: String,
    },
    CloseNotices,
    CloseSyncModal,
    /// Check whether a path exists
    ExpectExists {
        #[serde(default)]
        side: Side,
        path: String,
        #[serde(default = "default_true")]
        present: bool,
    },
    /// Both trees hold the same files with matching mtimes
    ExpectTreesConverged {
        direction: SyncDirection,
    },
    /// A stale folder was removed without collateral damage
    ExpectFolderRemoved {
        removed: String,
        sibling: String,
        #[serde(default = "default_one")]
        removed_count: u64,
    },
    /// Look up a setting row in the plugin's settings tab
    ExpectSetting {
        label: String,
        #[serde(default = "default_true")]
        present: bool,
    },
    /// Click a toggle and check the stored boolean flipped
    ToggleSetting {
        label: String,
        key: Vec<String>,
    },
    /// Save a screenshot
    Screenshot {
        label: String,
    },
    /// Evaluate a script in the application
    Evaluate {
        expression: String,
        /// Expected value
        expect: Option<Value>,
    },
}

fn default_true() -> bool {
    true
}

fn default_one() -> u64 {
    1
}

impl TestStep {
    /// Short description for progress output
    pub fn describe(&self) -> String {
        match self {
            TestStep::InjectSettings { overrides: None } => "inject default settings".to_string(),
            TestStep::InjectSettings { overrides: Some(o) } => format!("inject settings with {}", o),
            TestStep::ExtractSettings { .. } => "extract settings".to_string(),
            TestStep::WriteFile { side, path, .. } => format!("write {:?}:{}", side, path),
            TestStep::Remove { side, path } => format!("remove {:?}:{}", side, path),
            TestStep::Wipe { side } => format!("wipe {:?}", side),
            TestStep::Upload => "upload".to_string(),
            TestStep::Download => "download".to_string(),
            TestStep::TestConnection => "test connection".to_string(),
            TestStep::ExpectNotice { contains, .. } => format!("expect notice '{}'", contains),
            TestStep::ExpectSingleNotice { contains } => {
                format!("expect single notice '{}'", contains)
            }
            TestStep::CloseNotices => "close notices".to_string(),
            TestStep::CloseSyncModal => "close sync modal".to_string(),
            TestStep::ExpectExists {
                side,
                path,
                present,
            } => format!(
                "expect {:?}:{} {}",
                side,
                path,
                if *present { "present" } else { "absent" }
            ),
            TestStep::ExpectTreesConverged { direction } => {
                format!("expect trees converged after {}", direction)
            }
            TestStep::ExpectFolderRemoved { removed, .. } => {
                format!("expect {} removed", removed)
            }
            TestStep::ExpectSetting { label, .. } => format!("find setting '{}'", label),
            TestStep::ToggleSetting { label, .. } => format!("toggle '{}'", label),
            TestStep::Screenshot { label } => format!("screenshot '{}'", label),
            TestStep::Evaluate { expression, .. } => format!("evaluate {}", expression),
        }
    }
}

/// Collect scenario files from files and directories, sorted per directory
pub fn discover_scenarios(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.extension()
                        .map(|ext| ext == "yaml" || ext == "yml")
                        .unwrap_or(false)
                })
                .collect();
            entries.sort();
            found.extend(entries);
        } else if path.is_file() {
            found.push(path.clone());
        } else {
            return Err(Error::Config(format!(
                "Scenario path '{}' does not exist",
                path.display()
            )));
        }
    }
    Ok(found)
}
