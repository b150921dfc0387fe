//! Resource lifecycle
//!
//! Acquires the vault, the remote store and the application session in
//! dependency order and releases them on every exit path. Tests run inside
//! [`scope`], which takes a failure screenshot and tears everything down
//! whether the body returned an error or panicked.
//!
//! The individual resources also clean up on `Drop` as a last resort, but
//! that path can't wait for processes to exit, so [`Fixtures::release`] is
//! the one that counts.

pub mod remote;
pub mod session;
pub mod teardown;
pub mod vault;

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Duration;

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;
use serde::Deserialize;

use crate::common::config::Config;
use crate::common::{Error, Result};

pub use remote::RemoteStore;
pub use session::AppSession;
pub use teardown::TeardownStrategy;
pub use vault::Vault;

/// Which resources a test needs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FixtureRequest {
    pub vault: bool,
    pub remote: bool,
    pub app: bool,
    /// Copy the vault into the remote root share before the app starts
    pub preseed: bool,
}

impl FixtureRequest {
    /// Everything, with the remote preseeded from the vault
    pub fn all_preseeded() -> Self {
        Self {
            vault: true,
            remote: true,
            app: true,
            preseed: true,
        }
    }

    /// Fill in the resources the requested ones depend on
    pub fn resolved(self) -> Self {
        let remote = self.remote || self.preseed;
        Self {
            vault: self.vault || self.app || self.preseed,
            remote,
            app: self.app,
            preseed: self.preseed,
        }
    }
}

/// The resources held by one test
pub struct Fixtures {
    config: Config,
    strategy: TeardownStrategy,
    artifacts_dir: PathBuf,
    vault: Option<Vault>,
    remote: Option<RemoteStore>,
    app: Option<AppSession>,
}

impl Fixtures {
    /// Acquire the requested resources
    ///
    /// Whatever was already acquired is released again if a later step fails.
    pub async fn acquire(config: &Config, request: FixtureRequest, artifacts_dir: PathBuf) -> Result<Self> {
        let mut fixtures = Self {
            config: config.clone(),
            strategy: TeardownStrategy::current(Duration::from_millis(config.remote.kill_wait_ms)),
            artifacts_dir,
            vault: None,
            remote: None,
            app: None,
        };
        if let Err(e) = fixtures.acquire_all(request.resolved()).await {
            tracing::error!("Fixture setup failed: {}", e);
            fixtures.release().await;
            return Err(e);
        }
        Ok(fixtures)
    }

    async fn acquire_all(&mut self, request: FixtureRequest) -> Result<()> {
        if request.vault {
            self.vault = Some(Vault::create(&self.config)?);
        }
        if request.remote {
            self.remote = Some(RemoteStore::start(&self.config).await?);
        }
        if request.preseed {
            self.preseed()?;
        }
        if request.app {
            let vault = self.vault()?;
            let mut app = AppSession::launch(&self.config, vault.root(), vault.name()).await?;
            app.set_artifacts_dir(self.artifacts_dir.clone());
            self.app = Some(app);
        }
        Ok(())
    }

    /// Mirror the vault's current contents into the remote root share
    pub fn preseed(&self) -> Result<()> {
        let source = self.vault()?.root().to_path_buf();
        let target = self.remote()?.root_vault_path()?;
        vault::copy_tree(&source, &target)?;
        tracing::info!("Preseeded {} from {}", target.display(), source.display());
        Ok(())
    }

    /// The configuration the fixtures were built from
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Where this test's screenshots go
    pub fn artifacts_dir(&self) -> &PathBuf {
        &self.artifacts_dir
    }

    pub fn vault(&self) -> Result<&Vault> {
        self.vault.as_ref().ok_or_else(|| not_requested("vault"))
    }

    pub fn remote(&self) -> Result<&RemoteStore> {
        self.remote.as_ref().ok_or_else(|| not_requested("remote"))
    }

    pub fn app(&self) -> Result<&AppSession> {
        self.app.as_ref().ok_or_else(|| not_requested("app"))
    }

    /// Release everything in reverse acquisition order
    ///
    /// Never fails; problems are logged.
    pub async fn release(&mut self) {
        if let Some(mut app) = self.app.take() {
            app.close().await;
        }
        if let Some(mut remote) = self.remote.take() {
            remote.release(&self.strategy).await;
        }
        if let Some(mut vault) = self.vault.take() {
            vault.release(&self.strategy).await;
        }
    }
}

fn not_requested(what: &str) -> Error {
    Error::Config(format!("The {} fixture was not requested for this test", what))
}

/// Run `body` with freshly acquired fixtures and release them afterwards
///
/// Teardown runs whether the body succeeds, fails or panics. Failures get a
/// screenshot first; panics are resumed after teardown.
pub async fn scope<T, F>(
    config: &Config,
    request: FixtureRequest,
    artifacts_dir: PathBuf,
    body: F,
) -> Result<T>
where
    F: for<'a> FnOnce(&'a mut Fixtures) -> LocalBoxFuture<'a, Result<T>>,
{
    let mut fixtures = Fixtures::acquire(config, request, artifacts_dir).await?;

    let outcome = AssertUnwindSafe(body(&mut fixtures)).catch_unwind().await;

    let failed = !matches!(outcome, Ok(Ok(_)));
    if failed {
        if let Some(app) = fixtures.app.as_ref() {
            app.screenshot("failure").await;
        }
    }
    fixtures.release().await;

    match outcome {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn local_config(tmp: &TempDir) -> Config {
        let template = tmp.path().join("test-vaults/template");
        fs::create_dir_all(template.join("canary")).unwrap();
        fs::write(template.join("canary/awooken.md"), "awoo").unwrap();
        let dist = tmp.path().join("dist");
        fs::create_dir_all(&dist).unwrap();
        fs::write(dist.join("main.js"), "").unwrap();

        let mut config = Config::default();
        config.workdir = tmp.path().to_path_buf();
        config.vault.template = template;
        config.app.plugin_dist = dist;
        config
    }

    #[test]
    fn test_request_pulls_in_dependencies() {
        let request = FixtureRequest {
            app: true,
            preseed: true,
            ..Default::default()
        }
        .resolved();
        assert!(request.vault && request.remote && request.app);
    }

    #[tokio::test]
    async fn test_scope_releases_after_success() {
        let tmp = TempDir::new().unwrap();
        let config = local_config(&tmp);
        let request = FixtureRequest {
            vault: true,
            ..Default::default()
        };

        let root = scope(&config, request, tmp.path().join("artifacts"), |fx| {
            Box::pin(async move {
                let vault = fx.vault()?;
                assert!(vault.path("canary/awooken.md").is_file());
                Ok(vault.root().to_path_buf())
            })
        })
        .await
        .unwrap();
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_scope_releases_after_failure() {
        let tmp = TempDir::new().unwrap();
        let config = local_config(&tmp);
        let vault_root = config.resolve(&config.vault.path);
        let request = FixtureRequest {
            vault: true,
            ..Default::default()
        };

        let result: Result<()> = scope(&config, request, tmp.path().join("artifacts"), |fx| {
            Box::pin(async move {
                fx.vault()?;
                Err(Error::assertion("tree mismatch"))
            })
        })
        .await;
        assert!(matches!(result, Err(Error::Assertion(_))));
        assert!(!vault_root.exists());
    }

    #[tokio::test]
    async fn test_scope_releases_after_panic() {
        let tmp = TempDir::new().unwrap();
        let config = local_config(&tmp);
        let vault_root = config.resolve(&config.vault.path);
        let request = FixtureRequest {
            vault: true,
            ..Default::default()
        };

        let panicked = AssertUnwindSafe(scope(&config, request, tmp.path().join("a"), |_fx| {
            Box::pin(async move {
                if vault_root.exists() {
                    panic!("assertion inside test body");
                }
                Ok(())
            })
        }))
        .catch_unwind()
        .await;
        assert!(panicked.is_err());
        assert!(!config.resolve(&config.vault.path).exists());
    }

    #[tokio::test]
    async fn test_unrequested_fixture_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let config = local_config(&tmp);
        let mut fixtures = Fixtures::acquire(&config, FixtureRequest::default(), tmp.path().join("a"))
            .await
            .unwrap();
        assert!(matches!(fixtures.remote(), Err(Error::Config(_))));
        fixtures.release().await;
    }
}
