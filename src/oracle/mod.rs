//! Sync oracle
//!
//! Decides whether a sync did what it should by looking at both file trees
//! and at the notices the application showed.

pub mod notice;
pub mod tree;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};

pub use notice::{is_blocked, read_notices, SyncReport, BLOCKED_MARKER};
pub use tree::{assert_converged, compare_trees, DirectoryComparison, MTIME_TOLERANCE};

/// Which way a sync moves data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    /// Vault to remote
    Push,
    /// Remote to vault
    Pull,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Pull => write!(f, "pull"),
        }
    }
}

/// What a stale-folder removal should have done
#[derive(Debug, Clone)]
pub struct FolderRemoval<'a> {
    /// Vault-relative subtree that was deleted on the sending side
    pub removed: &'a str,
    /// Vault-relative subtree that must survive
    pub sibling: &'a str,
    /// Removed-folder count the notice must report
    pub removed_count: u64,
}

/// Check a stale-folder removal against both trees and the notices
///
/// The counterpart of `removed` must be gone from both sides, `sibling` must
/// still exist on both sides, and there must be exactly one completion
/// notice reporting `removed_count` folders and no errors.
pub fn verify_folder_removed(
    vault: &Path,
    remote: &Path,
    expected: &FolderRemoval<'_>,
    notices: Vec<String>,
) -> Result<SyncReport> {
    for root in [vault, remote] {
        let gone = root.join(expected.removed);
        if gone.exists() {
            return Err(Error::assertion(format!(
                "{} should have been removed",
                gone.display()
            )));
        }
        let kept = root.join(expected.sibling);
        if !kept.exists() {
            return Err(Error::assertion(format!(
                "{} was removed along with {}",
                kept.display(),
                expected.removed
            )));
        }
    }

    let report = SyncReport::expect(&notice::single(notices)?)?;
    if report.folders_removed != expected.removed_count || report.errors != 0 {
        return Err(Error::assertion(format!(
            "expected {} stale folders removed with 0 errors, notice said: {}",
            expected.removed_count, report
        )));
    }
    Ok(report)
}

/// Check that a sync after a wipe was refused
pub fn verify_blocked(notices: Vec<String>) -> Result<String> {
    notice::expect_single_containing(notices, BLOCKED_MARKER)
}

/// Check that a sync in `direction` completed without errors
pub fn verify_completed(direction: SyncDirection, notices: Vec<String>) -> Result<SyncReport> {
    let report = SyncReport::expect(&notice::single(notices)?)?;
    if report.direction != direction {
        return Err(Error::assertion(format!(
            "expected a {} report, got: {}",
            direction, report
        )));
    }
    if report.errors != 0 {
        return Err(Error::assertion(format!("{} reported errors: {}", direction, report)));
    }
    Ok(report)
}
