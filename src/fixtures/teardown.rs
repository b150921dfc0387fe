//! Platform-specific release behaviour
//!
//! Call sites ask the strategy to stop a process or purge a directory and
//! never branch on the platform themselves. Release never fails: problems are
//! logged at `warn` and swallowed.

use std::io;
use std::path::Path;
use std::time::Duration;

use tokio::process::Child;

use crate::common::Platform;

/// How resources are released on the current platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownStrategy {
    /// Upper bound on waiting for a killed process to be reaped
    pub kill_wait: Duration,
    /// Extra purge attempts after the first one fails
    pub purge_retries: u32,
    /// Delay between purge attempts
    pub purge_backoff: Duration,
}

impl TeardownStrategy {
    /// Strategy for a platform
    ///
    /// Windows keeps file locks for a while after the owning process dies,
    /// so purges there are retried.
    pub fn for_platform(platform: Platform, kill_wait: Duration) -> Self {
        match platform {
            Platform::Windows => Self {
                kill_wait,
                purge_retries: 5,
                purge_backoff: Duration::from_millis(200),
            },
            Platform::Linux | Platform::MacOS => Self {
                kill_wait,
                purge_retries: 0,
                purge_backoff: Duration::ZERO,
            },
        }
    }

    /// Strategy for the platform we're running on
    pub fn current(kill_wait: Duration) -> Self {
        Self::for_platform(Platform::current(), kill_wait)
    }

    /// Forcefully stop a process and wait a bounded time for it to exit
    pub async fn stop_process(&self, name: &str, child: &mut Child) {
        if let Err(e) = child.start_kill() {
            // Already reaped
            if e.kind() != io::ErrorKind::InvalidInput {
                tracing::warn!("Failed to kill {}: {}", name, e);
            }
        }
        match tokio::time::timeout(self.kill_wait, child.wait()).await {
            Ok(Ok(status)) => tracing::info!("{} exited ({})", name, status),
            Ok(Err(e)) => tracing::warn!("Failed to reap {}: {}", name, e),
            Err(_) => tracing::warn!(
                "{} still running {} ms after kill",
                name,
                self.kill_wait.as_millis()
            ),
        }
    }

    /// Remove a directory tree, tolerating absence and transient locks
    pub async fn purge(&self, dir: &Path) {
        if let Err(e) = self.clear(dir).await {
            tracing::warn!("Could not purge {}: {}", dir.display(), e);
        }
    }

    /// Remove a directory tree with the platform's retries, reporting failure
    ///
    /// Used before a resource is created, where leftovers must not survive.
    pub async fn clear(&self, dir: &Path) -> io::Result<()> {
        let mut attempt = 0;
        loop {
            match remove_tree(dir) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.purge_retries => {
                    tracing::debug!("Purge of {} failed, retrying: {}", dir.display(), e);
                    attempt += 1;
                    tokio::time::sleep(self.purge_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Blocking purge for `Drop` paths, single attempt
    pub fn purge_now(dir: &Path) {
        if let Err(e) = remove_tree(dir) {
            tracing::warn!("Could not purge {}: {}", dir.display(), e);
        }
    }
}

fn remove_tree(dir: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
