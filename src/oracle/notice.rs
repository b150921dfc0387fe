//! Notices emitted by the application
//!
//! Notices are transient; read them before triggering the next action.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};
use crate::webdriver::{By, Session};

use super::SyncDirection;

pub const NOTICE_CONTAINER_CLASS: &str = "notice-container";
pub const NOTICE_CLASS: &str = "notice";

/// Marker in the notice shown when a sync is refused as unsafe
pub const BLOCKED_MARKER: &str = "Action blocked";

/// Text of every notice currently on screen, oldest first
pub async fn read_notices(session: &Session) -> Result<Vec<String>> {
    let mut texts = Vec::new();
    for container in session.find_elements(&By::class(NOTICE_CONTAINER_CLASS)).await? {
        for notice in session
            .find_elements_in(&container, &By::class(NOTICE_CLASS))
            .await?
        {
            texts.push(session.text(&notice).await?);
        }
    }
    Ok(texts)
}

/// Pick the only notice out of a list
pub fn single(mut notices: Vec<String>) -> Result<String> {
    match notices.len() {
        1 => Ok(notices.remove(0)),
        n => Err(Error::assertion(format!(
            "expected exactly one notice, found {}: {:?}",
            n, notices
        ))),
    }
}

/// Counts reported by a finished push or pull
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub direction: SyncDirection,
    pub files_updated: u64,
    pub folders_removed: u64,
    pub errors: u64,
}

fn report_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    if let Some(re) = PATTERN.get() {
        return Ok(re);
    }
    let re = Regex::new(
        r"(Push|Pull) complete\. (\d+) files were updated, and (\d+) stale folders were removed \((\d+) errors\)",
    )
    .map_err(|e| Error::Internal(e.to_string()))?;
    Ok(PATTERN.get_or_init(|| re))
}

impl SyncReport {
    /// Parse a completion notice; `None` for any other notice
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let Some(caps) = report_pattern()?.captures(text) else {
            return Ok(None);
        };
        let number = |i: usize| -> Result<u64> {
            caps[i]
                .parse()
                .map_err(|e| Error::assertion(format!("bad count in notice '{}': {}", text, e)))
        };
        let direction = match &caps[1] {
            "Push" => SyncDirection::Push,
            _ => SyncDirection::Pull,
        };
        Ok(Some(Self {
            direction,
            files_updated: number(2)?,
            folders_removed: number(3)?,
            errors: number(4)?,
        }))
    }

    /// Parse a notice that must be a completion report
    pub fn expect(text: &str) -> Result<Self> {
        Self::parse(text)?
            .ok_or_else(|| Error::assertion(format!("not a sync report: '{}'", text)))
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.direction {
            SyncDirection::Push => "Push",
            SyncDirection::Pull => "Pull",
        };
        write!(
            f,
            "{} complete. {} files were updated, and {} stale folders were removed ({} errors).",
            verb, self.files_updated, self.folders_removed, self.errors
        )
    }
}

/// Whether a notice reports a refused sync
pub fn is_blocked(text: &str) -> bool {
    text.contains(BLOCKED_MARKER)
}

/// Assert `notices` holds exactly one notice containing `needle`
pub fn expect_single_containing(notices: Vec<String>, needle: &str) -> Result<String> {
    let notice = single(notices)?;
    if !notice.contains(needle) {
        return Err(Error::assertion(format!(
            "notice '{}' does not contain '{}'",
            notice, needle
        )));
    }
    Ok(notice)
}
