//! UI actions against the plugin under test
//!
//! Clicks and element queries for the settings pane, the sync modal and
//! notices. Anything that isn't a click goes through the script bridge.
//! Actions that trigger asynchronous work wait for the application's notice
//! instead of sleeping.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use crate::bridge::{self, settings};
use crate::common::wait::{wait_until, Poll};
use crate::common::{Error, Result};
use crate::fixtures::AppSession;
use crate::oracle::{read_notices, SyncDirection};
use crate::webdriver::{By, Element};

pub const RIBBON_BUTTON_ID: &str = "webdav-ribbon-btn";
pub const SYNC_UP_ID: &str = "webdav-sync-up";
pub const SYNC_DOWN_ID: &str = "webdav-sync-down";
pub const SYNC_MODAL_HEADER_ID: &str = "webdav-sync-modal-header";
pub const TEST_CONNECTION_ID: &str = "webdav-settings-test-connection";

const NAV_ITEM_CLASS: &str = "vertical-tab-nav-item";
const SETTING_ITEM_CLASS: &str = "setting-item";
const SETTING_NAME_CLASS: &str = "setting-item-name";
const SETTING_INFO_CLASS: &str = "setting-item-info";
const SETTING_CONTROL_CLASS: &str = "setting-item-control";
const MODAL_CLOSE_CLASS: &str = "modal-close-button";
const NOTICE_CLASS: &str = "notice";

/// Find an element, mapping "not there" to a fatal lookup error
async fn find_required(app: &AppSession, by: &By, what: &str) -> Result<Element> {
    match app.session().find_element(by).await {
        Err(Error::WebDriver { error, .. }) if error == "no such element" => {
            Err(Error::element_not_found(what))
        }
        other => other,
    }
}

async fn click(app: &AppSession, by: &By, what: &str) -> Result<()> {
    let element = find_required(app, by, what).await?;
    app.session().click(&element).await
}

/// Open the application's settings window
pub async fn open_settings(app: &AppSession) -> Result<()> {
    bridge::execute_value(app, "app.setting.open()").await?;
    find_required(app, &By::class(NAV_ITEM_CLASS), "the settings navigation").await?;
    Ok(())
}

/// Switch the settings window to the plugin's tab
pub async fn click_settings_nav(app: &AppSession) -> Result<()> {
    let title = app.settings_title();
    let item = app
        .session()
        .find_with_text(&By::class(NAV_ITEM_CLASS), title)
        .await?
        .ok_or_else(|| Error::element_not_found(format!("the '{}' settings tab", title)))?;
    app.session().click(&item).await
}

/// A setting row in the plugin's settings tab
#[derive(Debug, Clone)]
pub struct SettingHandle {
    pub container: Element,
    pub info: Element,
    pub control: Element,
    pub input: Element,
}

/// Locate the setting row labelled `label`
///
/// Only rows with exactly one info block, one control block and one input
/// are accepted. Rows of other plugins are not rendered in this tab, so
/// looking one up fails the same way as a made-up label.
pub async fn find_setting(app: &AppSession, label: &str) -> Result<SettingHandle> {
    let session = app.session();
    for container in session.find_elements(&By::class(SETTING_ITEM_CLASS)).await? {
        let names = session
            .find_elements_in(&container, &By::class(SETTING_NAME_CLASS))
            .await?;
        let mut matched = false;
        for name in &names {
            if session.text(name).await? == label {
                matched = true;
                break;
            }
        }
        if !matched {
            continue;
        }

        let info = exactly_one(app, &container, &By::class(SETTING_INFO_CLASS), label).await?;
        let control = exactly_one(app, &container, &By::class(SETTING_CONTROL_CLASS), label).await?;
        let input = exactly_one(app, &container, &By::tag("input"), label).await?;
        return Ok(SettingHandle {
            container,
            info,
            control,
            input,
        });
    }
    Err(Error::element_not_found(format!("the '{}' setting", label)))
}

async fn exactly_one(app: &AppSession, parent: &Element, by: &By, label: &str) -> Result<Element> {
    let mut found = app.session().find_elements_in(parent, by).await?;
    match found.len() {
        1 => Ok(found.remove(0)),
        n => Err(Error::assertion(format!(
            "setting '{}' has {} elements matching {}, expected 1",
            label, n, by
        ))),
    }
}

/// The control block of the setting labelled `label`
pub async fn find_setting_input(app: &AppSession, label: &str) -> Result<Element> {
    Ok(find_setting(app, label).await?.control)
}

/// Values of a settings key before and after a toggle
#[derive(Debug, Clone, PartialEq)]
pub struct Toggled {
    pub before: Value,
    pub after: Value,
}

impl Toggled {
    /// Whether the stored boolean was inverted
    pub fn flipped(&self) -> bool {
        matches!((&self.before, &self.after), (Value::Bool(b), Value::Bool(a)) if a != b)
    }
}

/// Click the checkbox of `label` and read the stored value at `key`
pub async fn toggle_setting(app: &AppSession, label: &str, key: &[&str]) -> Result<Toggled> {
    let setting = find_setting(app, label).await?;
    let kind = app.session().attribute(&setting.input, "type").await?;
    if kind.as_deref() != Some("checkbox") {
        return Err(Error::assertion(format!(
            "setting '{}' is not a toggle (input type {:?})",
            label, kind
        )));
    }

    let read = move || async move {
        let raw = settings::extract_settings_raw(app, app.plugin_id()).await?;
        Ok::<_, Error>(settings::lookup(&raw, key).cloned().unwrap_or(Value::Null))
    };

    let before = read().await?;
    app.session().click(&setting.input).await?;
    let what = format!("'{}' to be stored", label);
    let previous = &before;
    let after = wait_until(&what, Poll::within(app.settle()), move || async move {
        let now = read().await?;
        Ok((now != *previous).then_some(now))
    })
    .await?;

    tracing::info!("Toggled '{}': {} -> {}", label, before, after);
    Ok(Toggled { before, after })
}

/// Open the sync modal from the ribbon
pub async fn open_sync_modal(app: &AppSession) -> Result<()> {
    click(app, &By::id(RIBBON_BUTTON_ID), "the sync ribbon button").await?;
    find_required(app, &By::id(SYNC_MODAL_HEADER_ID), "the sync modal").await?;
    Ok(())
}

/// Wait until at least one notice is on screen and return all of them
///
/// Waits one settle period after the first notice so a second one isn't
/// missed.
pub async fn wait_for_notices(app: &AppSession) -> Result<Vec<String>> {
    let session = app.session();
    wait_until(
        "a notice to appear",
        Poll::within(app.notice_timeout()).every(Duration::from_millis(200)),
        move || async move {
            let notices = read_notices(session).await?;
            Ok((!notices.is_empty()).then_some(()))
        },
    )
    .await?;
    tokio::time::sleep(app.settle()).await;
    read_notices(session).await
}

async fn sync(app: &AppSession, direction: SyncDirection) -> Result<Vec<String>> {
    open_sync_modal(app).await?;
    let (id, what) = match direction {
        SyncDirection::Push => (SYNC_UP_ID, "the upload button"),
        SyncDirection::Pull => (SYNC_DOWN_ID, "the download button"),
    };
    tracing::info!("Starting {}", direction);
    click(app, &By::id(id), what).await?;
    let notices = wait_for_notices(app).await?;
    tracing::info!("{} finished: {:?}", direction, notices);
    Ok(notices)
}

/// Push the vault and return the notices it produced
pub async fn upload(app: &AppSession) -> Result<Vec<String>> {
    sync(app, SyncDirection::Push).await
}

/// Pull the remote and return the notices it produced
pub async fn download(app: &AppSession) -> Result<Vec<String>> {
    sync(app, SyncDirection::Pull).await
}

/// Run the connection test from the settings tab
pub async fn test_connection(app: &AppSession) -> Result<Vec<String>> {
    open_settings(app).await?;
    click_settings_nav(app).await?;
    click(app, &By::id(TEST_CONNECTION_ID), "the test connection button").await?;
    wait_for_notices(app).await
}

/// Dismiss every notice on screen
pub async fn close_notices(app: &AppSession) -> Result<()> {
    let session = app.session();
    // Dismissing one notice can re-render the container under the others
    for notice in session.find_elements(&By::class(NOTICE_CLASS)).await? {
        skip_stale(session.click(&notice).await)?;
    }
    wait_until(
        "notices to close",
        Poll::within(app.notice_timeout()),
        move || async move {
            match read_notices(session).await {
                Ok(notices) => Ok(notices.is_empty().then_some(())),
                Err(e) if e.is_stale_element() => Ok(None),
                Err(e) => Err(e),
            }
        },
    )
    .await
}

/// Treat an element that went stale as already handled
fn skip_stale(result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.is_stale_element() => {
            tracing::debug!("Element went stale: {}", e);
            Ok(())
        }
        other => other,
    }
}

/// Close the sync modal if it is open
pub async fn close_sync_modal(app: &AppSession) -> Result<()> {
    for close in app
        .session()
        .find_elements(&By::class(MODAL_CLOSE_CLASS))
        .await?
    {
        app.session().click(&close).await?;
    }
    Ok(())
}

/// Save a labelled screenshot into the artifacts directory
pub async fn screenshot(app: &AppSession, label: &str) -> Option<PathBuf> {
    app.screenshot(label).await
}
