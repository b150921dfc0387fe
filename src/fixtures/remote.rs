//! Remote store fixture
//!
//! Runs the file server against a fresh data directory. Shares are fixed
//! offsets under the data directory, as laid out in the server's config file.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::Instant;

use crate::common::config::{Config, ShareConfig};
use crate::common::wait::{wait_until, Poll};
use crate::common::{Error, Result};

use super::teardown::TeardownStrategy;

/// Name of the share that mirrors the whole vault
pub const ROOT_SHARE: &str = "root";

/// A running remote file server owned by one test
#[derive(Debug)]
pub struct RemoteStore {
    child: Option<Child>,
    base_url: String,
    data_dir: PathBuf,
    cache_dir: PathBuf,
    shares: Vec<ShareConfig>,
}

impl RemoteStore {
    /// Purge leftovers, start the server and check that it stayed up
    pub async fn start(config: &Config) -> Result<Self> {
        let remote = &config.remote;
        let config_file = config.resolve(&remote.config_file);
        if !config_file.is_file() {
            return Err(Error::ServerStartFailed(format!(
                "server config {} not found; is the working directory right?",
                config_file.display()
            )));
        }

        let data_dir = config.resolve(&remote.data_dir);
        let cache_dir = config.resolve(&remote.cache_dir);
        let purge = TeardownStrategy::current(Duration::from_millis(remote.kill_wait_ms));
        for dir in [&cache_dir, &data_dir] {
            purge.clear(dir).await.map_err(|e| {
                Error::ServerStartFailed(format!(
                    "could not purge leftover {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        let program = which::which(&remote.program).map_err(|e| {
            Error::ServerStartFailed(format!("{} not found on PATH: {}", remote.program, e))
        })?;

        tracing::info!("Starting {} -c {}", program.display(), config_file.display());
        let child = Command::new(&program)
            .arg("-c")
            .arg(&config_file)
            .current_dir(&config.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ServerStartFailed(format!("{}: {}", program.display(), e)))?;

        let mut store = Self {
            child: Some(child),
            base_url: remote.base_url.clone(),
            data_dir,
            cache_dir,
            shares: remote.shares.clone(),
        };
        store
            .await_liveness(Duration::from_millis(remote.startup_grace_ms))
            .await?;
        Ok(store)
    }

    /// Wait for the server to answer over HTTP, failing if the process exits
    ///
    /// The process must still be running when the grace period ends, even if
    /// something answered earlier: on a port conflict the answer comes from
    /// whoever already holds the port. A server that is still running but not
    /// answering by then is accepted; the first request against it will tell.
    async fn await_liveness(&mut self, grace: Duration) -> Result<()> {
        let started = Instant::now();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(500))
            .build()?;
        let url = self.base_url.clone();

        let outcome = wait_until(
            "remote server to accept connections",
            Poll::within(grace).every(Duration::from_millis(200)),
            || {
                let exited = self.exit_status();
                let http = http.clone();
                let url = url.clone();
                async move {
                    if let Some(status) = exited {
                        return Err(Error::ServerStartFailed(format!(
                            "server exited immediately ({}); is the port already taken?",
                            status
                        )));
                    }
                    Ok(http.get(&url).send().await.ok().map(|_| ()))
                }
            },
        )
        .await;

        match outcome {
            Ok(()) => {
                tokio::time::sleep(grace.saturating_sub(started.elapsed())).await;
                if let Some(status) = self.exit_status() {
                    return Err(Error::ServerStartFailed(format!(
                        "server exited after {} answered ({}); is the port already taken?",
                        self.base_url, status
                    )));
                }
                tracing::info!("Remote server up at {}", self.base_url);
                Ok(())
            }
            Err(Error::WaitTimeout { .. }) => match self.exit_status() {
                Some(status) => Err(Error::ServerStartFailed(format!(
                    "server exited during startup ({})",
                    status
                ))),
                None => {
                    tracing::warn!("Remote server alive but not answering yet at {}", self.base_url);
                    Ok(())
                }
            },
            Err(e) => Err(e),
        }
    }

    fn exit_status(&mut self) -> Option<String> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => Some(status.to_string()),
            Ok(None) => None,
            Err(e) => Some(e.to_string()),
        }
    }

    /// Base URL of the server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Data directory root
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// On-disk path of a named share
    pub fn share_path(&self, name: &str) -> Result<PathBuf> {
        self.shares
            .iter()
            .find(|s| s.name == name)
            .map(|s| self.data_dir.join(&s.path))
            .ok_or_else(|| Error::Config(format!("No share named '{}' configured", name)))
    }

    /// On-disk path of the share that mirrors the vault
    pub fn root_vault_path(&self) -> Result<PathBuf> {
        self.share_path(ROOT_SHARE)
    }

    /// Kill the server and purge its directories
    pub async fn release(&mut self, strategy: &TeardownStrategy) {
        if let Some(mut child) = self.child.take() {
            strategy.stop_process("remote server", &mut child).await;
        }
        strategy.purge(&self.cache_dir).await;
        strategy.purge(&self.data_dir).await;
        tracing::info!("Remote store released");
    }
}

impl Drop for RemoteStore {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            TeardownStrategy::purge_now(&self.cache_dir);
            TeardownStrategy::purge_now(&self.data_dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(data_dir: &Path) -> RemoteStore {
        RemoteStore {
            child: None,
            base_url: "http://localhost:62169".to_string(),
            data_dir: data_dir.to_path_buf(),
            cache_dir: data_dir.with_file_name("cache"),
            shares: Config::default().remote.shares,
        }
    }

    #[test]
    fn test_share_paths_are_offsets_of_data_dir() {
        let store = store(Path::new("/srv/copyparty"));
        assert_eq!(
            store.root_vault_path().unwrap(),
            PathBuf::from("/srv/copyparty/vault")
        );
        assert_eq!(
            store.share_path("private_subfolder").unwrap(),
            PathBuf::from("/srv/copyparty/vault/private_subfolder")
        );
        assert!(matches!(store.share_path("nope"), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_missing_config_file_fails_before_spawn() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.workdir = tmp.path().to_path_buf();
        let err = RemoteStore::start(&config).await.unwrap_err();
        assert!(matches!(err, Error::ServerStartFailed(_)));
        assert!(err.is_fatal_setup());
    }

    fn config_in(workdir: &Path) -> Config {
        std::fs::write(workdir.join("copyparty.conf"), "").unwrap();
        let mut config = Config::default();
        config.workdir = workdir.to_path_buf();
        config.remote.startup_grace_ms = 1_000;
        config.remote.kill_wait_ms = 100;
        config
    }

    #[tokio::test]
    async fn test_unremovable_leftover_fails_start() {
        let tmp = TempDir::new().unwrap();
        let mut config = config_in(tmp.path());
        // A file in place of the data dir can't be purged as a tree
        std::fs::write(tmp.path().join("copyparty"), "stale").unwrap();
        config.remote.program = "definitely-not-a-server".to_string();

        let err = RemoteStore::start(&config).await.unwrap_err();
        match err {
            Error::ServerStartFailed(msg) => assert!(msg.contains("purge"), "{}", msg),
            other => panic!("unexpected error {:?}", other),
        }
    }

    /// Answer every HTTP request with 200 until the test process exits
    fn occupy_port() -> u16 {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
                );
            }
        });
        port
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_server_exiting_behind_occupied_port_fails_start() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let mut config = config_in(tmp.path());
        let script = tmp.path().join("fake-server");
        std::fs::write(&script, "#!/bin/sh\nsleep 0.3\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        config.remote.program = script.display().to_string();
        config.remote.base_url = format!("http://127.0.0.1:{}", occupy_port());

        let err = RemoteStore::start(&config).await.unwrap_err();
        match err {
            Error::ServerStartFailed(msg) => assert!(msg.contains("port"), "{}", msg),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_server_that_stays_up_is_accepted() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let mut config = config_in(tmp.path());
        let script = tmp.path().join("fake-server");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        config.remote.program = script.display().to_string();
        config.remote.base_url = format!("http://127.0.0.1:{}", occupy_port());

        let mut store = RemoteStore::start(&config).await.unwrap();
        assert!(store.exit_status().is_none());
        store
            .release(&TeardownStrategy::current(Duration::from_millis(500)))
            .await;
    }

    #[tokio::test]
    async fn test_release_purges_directories() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("copyparty");
        std::fs::create_dir_all(data.join("vault")).unwrap();
        std::fs::create_dir_all(tmp.path().join("cache")).unwrap();

        let mut store = store(&data);
        store
            .release(&TeardownStrategy::current(Duration::from_millis(10)))
            .await;
        assert!(!data.exists());
        assert!(!tmp.path().join("cache").exists());
    }
}
