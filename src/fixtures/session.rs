//! Application session fixture
//!
//! Launches the host application under the driver, points its file dialogs
//! at the vault, walks the launcher into the vault window and trusts the
//! plugin.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::bridge::{self, js_string, EvaluationResult, ScriptExecutor};
use crate::common::config::Config;
use crate::common::paths::{ensure_dir, sanitize};
use crate::common::wait::{wait_until, Poll};
use crate::common::{Error, Result};
use crate::setup;
use crate::webdriver::{By, DriverService, Session, Timeouts};

const OPEN_BUTTON: &str = "Open";
const CREATE_BUTTON: &str = "Create";
const BROWSE_BUTTON: &str = "Browse";
const TRUST_BUTTON: &str = "Trust author and enable plugins";
const VAULT_NAME_INPUT: &str = r#"input[placeholder="Vault name"]"#;
const MODAL_CLOSE: &str = "modal-close-button";

/// A live, bootstrapped application session
pub struct AppSession {
    service: DriverService,
    session: Session,
    plugin_id: String,
    settings_title: String,
    script_timeout: Duration,
    settle: Duration,
    notice_timeout: Duration,
    artifacts_dir: PathBuf,
    shots: AtomicUsize,
    closed: bool,
}

impl AppSession {
    /// Launch the application and open the vault at `vault_root`
    pub async fn launch(config: &Config, vault_root: &Path, vault_name: &str) -> Result<Self> {
        let driver = setup::ensure_driver(config).await?;
        let mut service =
            DriverService::start(&driver, Duration::from_secs(config.driver.startup_secs)).await?;

        let session = match service.client() {
            Ok(client) => client.new_session(&config.app_binary()).await,
            Err(e) => Err(e),
        };
        let session = match session {
            Ok(session) => session,
            Err(e) => {
                service.stop().await;
                return Err(Error::DriverStartFailed(e.to_string()));
            }
        };

        let mut app = Self {
            service,
            session,
            plugin_id: config.app.plugin_id.clone(),
            settings_title: config.app.settings_title.clone(),
            script_timeout: Duration::from_millis(config.app.script_timeout_ms),
            settle: Duration::from_millis(config.app.settle_ms),
            notice_timeout: Duration::from_millis(config.app.notice_timeout_ms),
            artifacts_dir: config.resolve(&config.artifacts.dir),
            shots: AtomicUsize::new(0),
            closed: false,
        };

        let timeouts = Timeouts {
            script: config.app.script_timeout_ms,
            implicit: config.app.implicit_wait_ms,
        };
        let bootstrap_timeout = Duration::from_millis(config.app.bootstrap_timeout_ms);
        let started = async {
            app.session.set_timeouts(timeouts).await?;
            app.bootstrap(vault_root, vault_name, bootstrap_timeout).await
        }
        .await;

        if let Err(e) = started {
            app.screenshot("bootstrap failure").await;
            app.close().await;
            return Err(e);
        }
        tracing::info!("Application session ready on {}", vault_root.display());
        Ok(app)
    }

    async fn bootstrap(&self, vault_root: &Path, vault_name: &str, timeout: Duration) -> Result<()> {
        let vault_path = vault_root.display().to_string();
        bridge::execute_value(self, &dialog_mock_script(&vault_path)).await?;

        if vault_root.exists() {
            tracing::info!("Vault exists, opening it");
            self.click_button(OPEN_BUTTON).await?;
        } else {
            tracing::info!("Creating vault {}", vault_name);
            self.click_button(CREATE_BUTTON).await?;
            let input = self.session.find_element(&By::css(VAULT_NAME_INPUT)).await?;
            self.session.send_keys(&input, vault_name).await?;
            self.click_button(BROWSE_BUTTON).await?;
            self.click_button(CREATE_BUTTON).await?;
        }

        self.await_vault_window(timeout).await?;
        self.click_button(TRUST_BUTTON).await?;
        self.dismiss_startup_modal().await
    }

    /// Wait for the launcher to close, then switch to the vault window
    async fn await_vault_window(&self, timeout: Duration) -> Result<()> {
        let closed = wait_until(
            "launcher window to close",
            Poll::within(timeout).every(Duration::from_millis(250)),
            move || async move {
                launcher_closed(self.session.page_source().await).map(|c| c.then_some(()))
            },
        )
        .await;

        match closed {
            Ok(()) => {}
            Err(Error::WaitTimeout { .. }) => {
                return Err(Error::Bootstrap(
                    "the launcher window is still open; the open/create flow did not complete"
                        .to_string(),
                ))
            }
            Err(e) => return Err(e),
        }

        let handles = self.session.window_handles().await?;
        match handles.as_slice() {
            [handle] => self.session.switch_to_window(handle).await,
            _ => Err(Error::Bootstrap(format!(
                "expected exactly one application window, found {}",
                handles.len()
            ))),
        }
    }

    async fn click_button(&self, label: &str) -> Result<()> {
        let button = self
            .session
            .find_with_text(&By::tag("button"), label)
            .await?
            .ok_or_else(|| Error::element_not_found(format!("the '{}' button", label)))?;
        self.session.click(&button).await
    }

    async fn dismiss_startup_modal(&self) -> Result<()> {
        for close in self.session.find_elements(&By::class(MODAL_CLOSE)).await? {
            tracing::debug!("Dismissing startup modal");
            self.session.click(&close).await?;
        }
        Ok(())
    }

    /// The underlying WebDriver session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Id of the plugin under test
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Settings navigation title of the plugin under test
    pub fn settings_title(&self) -> &str {
        &self.settings_title
    }

    /// Delay for the application's own async work after a UI action
    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// How long to wait for a notice after an action
    pub fn notice_timeout(&self) -> Duration {
        self.notice_timeout
    }

    /// Direct screenshots into a different directory
    pub fn set_artifacts_dir(&mut self, dir: PathBuf) {
        self.artifacts_dir = dir;
    }

    /// Save a screenshot, returning its path
    ///
    /// Screenshots are diagnostics: failures are logged, never returned.
    pub async fn screenshot(&self, label: &str) -> Option<PathBuf> {
        let n = self.shots.fetch_add(1, Ordering::SeqCst);
        let path = self
            .artifacts_dir
            .join(format!("{:02}-{}.png", n, sanitize(label)));
        let saved = async {
            let png = self.session.screenshot().await?;
            ensure_dir(&self.artifacts_dir)?;
            std::fs::write(&path, png)?;
            Ok::<_, Error>(())
        }
        .await;
        match saved {
            Ok(()) => {
                tracing::info!("Screenshot saved to {}", path.display());
                Some(path)
            }
            Err(e) => {
                tracing::warn!("Screenshot '{}' failed: {}", label, e);
                None
            }
        }
    }

    /// End the session and stop the driver
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.session.delete().await {
            tracing::warn!("Failed to close application session: {}", e);
        }
        self.service.stop().await;
    }
}

#[async_trait]
impl ScriptExecutor for AppSession {
    async fn evaluate(&self, script: &str) -> Result<EvaluationResult> {
        bridge::cdp_evaluate(&self.session, script).await
    }

    fn script_timeout(&self) -> Duration {
        self.script_timeout
    }
}

/// Replace the native open dialogs with ones that always pick `vault_path`
pub fn dialog_mock_script(vault_path: &str) -> String {
    let path = js_string(vault_path);
    format!(
        r#"(() => {{
    const dialog = electron.remote.dialog;
    dialog.showOpenDialog = async () => ({{ canceled: false, filePaths: [{path}] }});
    dialog.showOpenDialogSync = () => [{path}];
    return 0;
}})()"#,
        path = path
    )
}

/// Interpret a page-source probe during the launcher hand-over
///
/// The launcher and the vault are separate windows; once the launcher is gone
/// the driver reports `no such window` for it.
fn launcher_closed(probe: Result<String>) -> Result<bool> {
    match probe {
        Ok(_) => Ok(false),
        Err(e) if e.is_no_such_window() => Ok(true),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialog_mock_targets_vault() {
        let script = dialog_mock_script(r"C:\Users\it\test_vault");
        assert!(script.contains(r#"filePaths: ["C:\\Users\\it\\test_vault"]"#));
        assert!(script.contains("showOpenDialogSync = () => [\"C:\\\\Users"));
    }

    #[test]
    fn test_launcher_still_open() {
        assert!(!launcher_closed(Ok("<html/>".to_string())).unwrap());
    }

    #[test]
    fn test_launcher_closed_on_no_such_window() {
        let probe = Err(Error::webdriver("no such window", "target window already closed"));
        assert!(launcher_closed(probe).unwrap());
    }

    #[test]
    fn test_other_errors_propagate() {
        let probe = Err(Error::webdriver("invalid session id", "gone"));
        assert!(matches!(launcher_closed(probe), Err(Error::WebDriver { .. })));
    }
}
