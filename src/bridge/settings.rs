//! Settings injection and extraction
//!
//! Writes a settings object into the running plugin and reads the live one
//! back. Injection always persists before reloading the sync client: a reload
//! without the save is lost on the next read, and a save without the reload
//! leaves the old client in memory.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{Error, Result};

use super::{execute, execute_value, js_string, ScriptExecutor};

/// Base URL the remote store listens on in the default configuration
pub const DEFAULT_SERVER_URL: &str = "http://localhost:62169";

/// Value the injection script returns on success
const INJECTION_SENTINEL: i64 = 0;

/// Plugin settings as persisted by the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsObject {
    pub server_conf: ServerConf,
    pub sync: SyncSettings,
}

/// Connection to the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConf {
    pub url: Option<String>,
    // Omitted rather than null: the application drops undefined fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Where a folder is synced to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderDestination {
    pub dest: String,
}

/// Sync behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    pub full_vault_sync: bool,
    pub root_folder: FolderDestination,
    /// Vault path to share mapping
    #[serde(default)]
    pub subfolders: BTreeMap<String, FolderDestination>,
    pub ignore_workspace: bool,
    #[serde(default)]
    pub ignore_config_folder: bool,
}

impl Default for SettingsObject {
    fn default() -> Self {
        default_settings()
    }
}

/// The canonical settings used when a test doesn't provide its own
pub fn default_settings() -> SettingsObject {
    SettingsObject {
        server_conf: ServerConf {
            url: Some(DEFAULT_SERVER_URL.to_string()),
            username: Some("admin".to_string()),
            password: Some("hunter2".to_string()),
        },
        sync: SyncSettings {
            full_vault_sync: true,
            root_folder: FolderDestination {
                dest: "/vault".to_string(),
            },
            subfolders: BTreeMap::new(),
            ignore_workspace: true,
            ignore_config_folder: false,
        },
    }
}

impl SettingsObject {
    /// Canonical settings pointed at another server
    pub fn for_server(url: &str) -> Self {
        let mut settings = default_settings();
        settings.server_conf.url = Some(url.to_string());
        settings
    }

    /// Resolve a key path against the serialized form
    pub fn get_path(&self, keys: &[&str]) -> Option<Value> {
        let root = serde_json::to_value(self).ok()?;
        lookup(&root, keys).cloned()
    }

    /// Deep-merge a JSON patch into these settings
    ///
    /// Objects merge key by key; any other value replaces what was there.
    pub fn merged(&self, patch: &Value) -> Result<Self> {
        let mut root = serde_json::to_value(self)?;
        merge(&mut root, patch);
        serde_json::from_value(root)
            .map_err(|e| Error::Config(format!("Settings override doesn't fit the schema: {}", e)))
    }
}

/// Look up a dotted key path in a JSON value
pub fn lookup<'a>(root: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(root, |node, key| node.get(*key))
}

fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                merge(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// Script expression for the plugin instance
pub fn plugin_handle(plugin_id: &str) -> String {
    format!("app.plugins.plugins[{}]", js_string(plugin_id))
}

/// Build the injection script
pub fn injection_script(plugin_id: &str, settings: &SettingsObject) -> Result<String> {
    let payload = serde_json::to_string(settings)?;
    Ok(format!(
        r#"(async () => {{
    const plugin = {handle};
    plugin.settings = {payload};
    await plugin.saveSettings();
    await plugin.reloadClient();
    return {sentinel};
}})()"#,
        handle = plugin_handle(plugin_id),
        payload = payload,
        sentinel = INJECTION_SENTINEL,
    ))
}

/// Overwrite the plugin's live settings, persist them and reload the client
///
/// `None` injects [`default_settings`].
pub async fn inject_settings<E>(
    executor: &E,
    plugin_id: &str,
    settings: Option<&SettingsObject>,
) -> Result<()>
where
    E: ScriptExecutor + ?Sized,
{
    let default;
    let settings = match settings {
        Some(s) => s,
        None => {
            default = default_settings();
            &default
        }
    };

    let result = execute(executor, &injection_script(plugin_id, settings)?).await?;
    if let Some(message) = result.exception_message() {
        return Err(Error::Injection(message));
    }
    match result.value().as_i64() {
        Some(INJECTION_SENTINEL) => {
            tracing::info!("Injected settings for {}", plugin_id);
            Ok(())
        }
        _ => Err(Error::Injection(format!(
            "expected {} from the injection script, got {}",
            INJECTION_SENTINEL,
            result.value()
        ))),
    }
}

/// Read the plugin's live settings back
pub async fn extract_settings<E>(executor: &E, plugin_id: &str) -> Result<SettingsObject>
where
    E: ScriptExecutor + ?Sized,
{
    let raw = extract_settings_raw(executor, plugin_id).await?;
    Ok(serde_json::from_value(raw)?)
}

/// Read the plugin's live settings as untyped JSON
pub async fn extract_settings_raw<E>(executor: &E, plugin_id: &str) -> Result<Value>
where
    E: ScriptExecutor + ?Sized,
{
    let script = format!("JSON.stringify({}.settings)", plugin_handle(plugin_id));
    let value = execute_value(executor, &script).await?;
    let text = value.as_str().ok_or_else(|| {
        Error::ScriptException(format!("settings did not serialize to a string: {}", value))
    })?;
    Ok(serde_json::from_str(text)?)
}
