//! WebDriver client
//!
//! A thin JSON-over-HTTP client covering the commands the harness needs:
//! session management, element lookup and interaction, window handling,
//! screenshots, and the driver's CDP passthrough used for script evaluation.

use std::path::Path;
use std::time::Duration;

use base64::Engine;
use reqwest::Method;
use serde_json::{json, Value};

use crate::common::{Error, Result};

use super::types::{By, Element, Envelope, ErrorValue, NewSession, Timeouts};

/// Upper bound on any single HTTP round trip to the driver
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection to a driver service
#[derive(Debug, Clone)]
pub struct WebDriverClient {
    http: reqwest::Client,
    base_url: String,
}

impl WebDriverClient {
    /// Create a client for a driver listening at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Whether the driver reports itself ready to create sessions
    pub async fn is_ready(&self) -> bool {
        match self.command(Method::GET, "/status", None).await {
            Ok(value) => value.get("ready").and_then(Value::as_bool).unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Start a session driving the given browser-shell binary
    pub async fn new_session(&self, binary: &Path) -> Result<Session> {
        let caps = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "binary": binary.display().to_string(),
                        "args": [],
                    }
                }
            }
        });
        let value = self.command(Method::POST, "/session", Some(caps)).await?;
        let created: NewSession = serde_json::from_value(value)?;
        tracing::info!("WebDriver session {} started", created.session_id);
        Ok(Session {
            client: self.clone(),
            id: created.session_id,
        })
    }

    /// Send a command and unwrap the response envelope
    pub async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        tracing::trace!("WebDriver >>> {} {} {:?}", method, path, body);

        let mut request = self.http.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(&body);
        } else if method == Method::POST {
            request = request.json(&json!({}));
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        tracing::trace!("WebDriver <<< {} {}", status, text);

        let envelope: Envelope = serde_json::from_str(&text).map_err(|e| {
            Error::webdriver("invalid response", &format!("{} (status {}): {}", e, status, text))
        })?;

        if !status.is_success() {
            return Err(match serde_json::from_value::<ErrorValue>(envelope.value) {
                Ok(err) => Error::webdriver(&err.error, &err.message),
                Err(_) => Error::webdriver("unknown error", &format!("status {}", status)),
            });
        }
        Ok(envelope.value)
    }
}

/// A live WebDriver session
#[derive(Debug, Clone)]
pub struct Session {
    client: WebDriverClient,
    id: String,
}

impl Session {
    /// Session id assigned by the driver
    pub fn id(&self) -> &str {
        &self.id
    }

    async fn cmd(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let path = format!("/session/{}{}", self.id, path);
        self.client.command(method, &path, body).await
    }

    /// Set script and implicit-wait timeouts
    pub async fn set_timeouts(&self, timeouts: Timeouts) -> Result<()> {
        self.cmd(Method::POST, "/timeouts", Some(serde_json::to_value(timeouts)?))
            .await?;
        Ok(())
    }

    /// Run a Chrome DevTools Protocol command through the driver
    pub async fn execute_cdp(&self, cmd: &str, params: Value) -> Result<Value> {
        self.cmd(
            Method::POST,
            "/goog/cdp/execute",
            Some(json!({ "cmd": cmd, "params": params })),
        )
        .await
    }

    /// Find the first element matching a locator
    pub async fn find_element(&self, by: &By) -> Result<Element> {
        let value = self.cmd(Method::POST, "/element", Some(by.to_body())).await?;
        Element::from_value(&value)
            .ok_or_else(|| Error::webdriver("invalid response", "find element returned no reference"))
    }

    /// Find all elements matching a locator
    pub async fn find_elements(&self, by: &By) -> Result<Vec<Element>> {
        let value = self.cmd(Method::POST, "/elements", Some(by.to_body())).await?;
        Ok(elements_from(&value))
    }

    /// Find all elements matching a locator below `parent`
    pub async fn find_elements_in(&self, parent: &Element, by: &By) -> Result<Vec<Element>> {
        let path = format!("/element/{}/elements", parent.id);
        let value = self.cmd(Method::POST, &path, Some(by.to_body())).await?;
        Ok(elements_from(&value))
    }

    /// First element matching a locator whose rendered text is exactly `text`
    ///
    /// The launcher has no ids on its buttons, so they are matched by label.
    pub async fn find_with_text(&self, by: &By, text: &str) -> Result<Option<Element>> {
        for element in self.find_elements(by).await? {
            if self.text(&element).await? == text {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    /// Rendered text of an element
    pub async fn text(&self, element: &Element) -> Result<String> {
        let value = self
            .cmd(Method::GET, &format!("/element/{}/text", element.id), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Value of an attribute, `None` when absent
    pub async fn attribute(&self, element: &Element, name: &str) -> Result<Option<String>> {
        let value = self
            .cmd(
                Method::GET,
                &format!("/element/{}/attribute/{}", element.id, name),
                None,
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    /// Click an element
    pub async fn click(&self, element: &Element) -> Result<()> {
        self.cmd(Method::POST, &format!("/element/{}/click", element.id), None)
            .await?;
        Ok(())
    }

    /// Type text into an element
    pub async fn send_keys(&self, element: &Element, text: &str) -> Result<()> {
        self.cmd(
            Method::POST,
            &format!("/element/{}/value", element.id),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    /// Handles of all open windows
    pub async fn window_handles(&self) -> Result<Vec<String>> {
        let value = self.cmd(Method::GET, "/window/handles", None).await?;
        Ok(value
            .as_array()
            .map(|handles| {
                handles
                    .iter()
                    .filter_map(|h| h.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Switch to a window by handle
    pub async fn switch_to_window(&self, handle: &str) -> Result<()> {
        self.cmd(Method::POST, "/window", Some(json!({ "handle": handle })))
            .await?;
        Ok(())
    }

    /// Serialized DOM of the current window
    ///
    /// Fails with `no such window` once the current window has closed, which
    /// is how a finished launcher-to-app transition shows up.
    pub async fn page_source(&self) -> Result<String> {
        let value = self.cmd(Method::GET, "/source", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// PNG screenshot of the current window
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        let value = self.cmd(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| Error::webdriver("invalid response", "screenshot was not a string"))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::webdriver("invalid response", &format!("bad screenshot: {}", e)))
    }

    /// End the session
    pub async fn delete(&self) -> Result<()> {
        let path = format!("/session/{}", self.id);
        self.client.command(Method::DELETE, &path, None).await?;
        tracing::info!("WebDriver session {} closed", self.id);
        Ok(())
    }
}

fn elements_from(value: &Value) -> Vec<Element> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Element::from_value).collect())
        .unwrap_or_default()
}
