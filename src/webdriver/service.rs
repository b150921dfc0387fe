//! Driver service process
//!
//! Spawns the provisioned driver on a free local port and waits until it
//! answers `/status` as ready.

use std::net::TcpListener;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::common::wait::{wait_until, Poll};
use crate::common::{Error, Result};

use super::client::WebDriverClient;

/// A running driver process
pub struct DriverService {
    child: Child,
    url: String,
}

impl DriverService {
    /// Spawn the driver and wait for it to become ready
    pub async fn start(driver: &Path, startup: Duration) -> Result<Self> {
        let port = free_port()?;
        let url = format!("http://127.0.0.1:{}", port);

        tracing::info!("Starting driver {} on port {}", driver.display(), port);
        let child = Command::new(driver)
            .arg(format!("--port={}", port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::DriverStartFailed(format!("Failed to start {}: {}", driver.display(), e))
            })?;

        let mut service = Self { child, url };
        let client = service.client()?;

        let ready = wait_until("driver service to report ready", Poll::within(startup), || {
            let client = client.clone();
            async move { Ok(client.is_ready().await.then_some(())) }
        })
        .await;

        if let Err(e) = ready {
            service.stop().await;
            return Err(Error::DriverStartFailed(e.to_string()));
        }

        Ok(service)
    }

    /// Base URL of the service
    pub fn url(&self) -> &str {
        &self.url
    }

    /// A client bound to this service
    pub fn client(&self) -> Result<WebDriverClient> {
        WebDriverClient::new(&self.url)
    }

    /// Kill the driver process
    pub async fn stop(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!("Failed to stop driver service: {}", e);
        }
    }
}

/// Ask the OS for an unused local port
fn free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_port_is_nonzero() {
        assert_ne!(free_port().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_driver_binary() {
        let result =
            DriverService::start(Path::new("/nonexistent/driver"), Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::DriverStartFailed(_))));
    }
}
