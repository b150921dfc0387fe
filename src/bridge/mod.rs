//! Remote execution bridge
//!
//! Runs script snippets inside the host application out-of-band. Everything
//! that isn't a click (mocking dialogs, reading and writing the plugin's live
//! settings, reloading the sync client) goes through [`execute`].
//!
//! Backends only have to implement [`ScriptExecutor`]; the deadline is
//! enforced here so every backend fails the same way.

pub mod settings;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::common::{Error, Result};
use crate::webdriver::Session;

pub use settings::{extract_settings, inject_settings, SettingsObject};

/// Engine-side description of an evaluated value
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Details attached when the evaluated script threw
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub line_number: i64,
    #[serde(default)]
    pub column_number: i64,
    #[serde(default)]
    pub exception: Option<RemoteObject>,
}

/// Structured result of evaluating a script
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub result: RemoteObject,
    #[serde(default)]
    pub exception_details: Option<ExceptionDetails>,
}

impl EvaluationResult {
    /// Whether the script threw
    pub fn threw(&self) -> bool {
        self.exception_details.is_some()
    }

    /// The returned value, `Null` for `undefined`
    pub fn value(&self) -> &Value {
        self.result.value.as_ref().unwrap_or(&Value::Null)
    }

    /// Human-readable description of the thrown error
    pub fn exception_message(&self) -> Option<String> {
        self.exception_details.as_ref().map(|details| {
            details
                .exception
                .as_ref()
                .and_then(|e| e.description.clone())
                .unwrap_or_else(|| details.text.clone())
        })
    }

    /// The returned value, or an error if the script threw
    pub fn into_value(self) -> Result<Value> {
        if let Some(message) = self.exception_message() {
            return Err(Error::ScriptException(message));
        }
        Ok(self.result.value.unwrap_or(Value::Null))
    }
}

/// Anything that can evaluate script in the running application
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Evaluate `script` and wait for its (promise-resolved) result
    async fn evaluate(&self, script: &str) -> Result<EvaluationResult>;

    /// Deadline applied by [`execute`]
    fn script_timeout(&self) -> Duration;
}

/// Evaluate a script, failing with `SessionTimeout` past the deadline
pub async fn execute<E>(executor: &E, script: &str) -> Result<EvaluationResult>
where
    E: ScriptExecutor + ?Sized,
{
    let limit = executor.script_timeout();
    tracing::debug!("execute: {}", first_line(script));
    match tokio::time::timeout(limit, executor.evaluate(script)).await {
        Ok(result) => result,
        Err(_) => Err(Error::SessionTimeout(limit.as_millis() as u64)),
    }
}

/// Evaluate a script and return its value, treating a throw as an error
pub async fn execute_value<E>(executor: &E, script: &str) -> Result<Value>
where
    E: ScriptExecutor + ?Sized,
{
    execute(executor, script).await?.into_value()
}

/// Evaluate through the driver's DevTools passthrough
///
/// Promises are awaited and results returned by value, so scripts can be
/// written as async IIFEs that return plain data.
pub async fn cdp_evaluate(session: &Session, script: &str) -> Result<EvaluationResult> {
    let raw = session
        .execute_cdp(
            "Runtime.evaluate",
            json!({
                "expression": script,
                "awaitPromise": true,
                "returnByValue": true,
            }),
        )
        .await?;
    Ok(serde_json::from_value(raw)?)
}

/// Quote a string as a script literal
pub fn js_string(raw: &str) -> String {
    // JSON string literals are valid script string literals
    Value::String(raw.to_string()).to_string()
}

fn first_line(script: &str) -> &str {
    script.trim().lines().next().unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted executor for exercising bridge users without an application

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned results and records every script it was given
    pub struct FakeExecutor {
        pub responses: Mutex<VecDeque<Result<EvaluationResult>>>,
        pub scripts: Mutex<Vec<String>>,
        pub delay: Duration,
        pub timeout: Duration,
    }

    impl FakeExecutor {
        pub fn new(responses: Vec<Result<EvaluationResult>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                scripts: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
                timeout: Duration::from_secs(2),
            }
        }

        pub fn scripts(&self) -> Vec<String> {
            self.scripts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ScriptExecutor for FakeExecutor {
        async fn evaluate(&self, script: &str) -> Result<EvaluationResult> {
            self.scripts.lock().unwrap().push(script.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Internal("no canned response".into())))
        }

        fn script_timeout(&self) -> Duration {
            self.timeout
        }
    }

    /// A successful evaluation returning `value`
    pub fn returning(value: Value) -> Result<EvaluationResult> {
        Ok(EvaluationResult {
            result: RemoteObject {
                kind: "object".into(),
                subtype: None,
                class_name: None,
                value: Some(value),
                description: None,
            },
            exception_details: None,
        })
    }

    /// An evaluation whose script threw `message`
    pub fn throwing(message: &str) -> Result<EvaluationResult> {
        Ok(EvaluationResult {
            result: RemoteObject {
                kind: "object".into(),
                subtype: Some("error".into()),
                class_name: Some("TypeError".into()),
                value: None,
                description: Some(message.into()),
            },
            exception_details: Some(ExceptionDetails {
                text: "Uncaught (in promise)".into(),
                line_number: 0,
                column_number: 0,
                exception: Some(RemoteObject {
                    kind: "object".into(),
                    subtype: Some("error".into()),
                    class_name: Some("TypeError".into()),
                    value: None,
                    description: Some(message.into()),
                }),
            }),
        })
    }
}
