//! Bounded polling
//!
//! Every place the harness waits on the application or the remote server goes
//! through [`wait_until`] with an explicit predicate, instead of sleeping for
//! a fixed time and hoping the other side is done.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use super::{Error, Result};

/// Default interval between probes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Timeout and interval for one wait site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poll {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Poll {
    /// Poll at the default interval until `timeout`
    pub fn within(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the probe interval
    pub fn every(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Probe until it yields a value or the timeout elapses
///
/// The probe runs at least once, even with a zero timeout. Probe errors are
/// returned immediately; only `Ok(None)` keeps the loop going.
pub async fn wait_until<T, F, Fut>(what: &str, poll: Poll, mut probe: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now() + poll.timeout;
    loop {
        if let Some(value) = probe().await? {
            tracing::debug!(what, "wait satisfied");
            return Ok(value);
        }
        if Instant::now() >= deadline {
            return Err(Error::WaitTimeout {
                what: what.to_string(),
                millis: poll.timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(poll.interval).await;
    }
}
