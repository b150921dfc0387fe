//! WebDriver wire types
//!
//! Every response is wrapped in a `{"value": ...}` envelope. Errors carry
//! `{"error", "message", "stacktrace"}` inside that envelope together with a
//! non-2xx status. See: https://www.w3.org/TR/webdriver2/

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key under which element references are serialized
pub const ELEMENT_KEY: &str = "element-6066-11e4-a07c-4a4b9b9a38d5";

/// Response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub value: Value,
}

/// Error payload inside the envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorValue {
    pub error: String,
    #[serde(default)]
    pub message: String,
}

/// Result of `POST /session`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub session_id: String,
    #[serde(default)]
    pub capabilities: Value,
}

/// Session timeouts in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    pub script: u64,
    pub implicit: u64,
}

/// An element reference returned by a find command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub id: String,
}

impl Element {
    /// Extract an element reference from a JSON value
    pub fn from_value(value: &Value) -> Option<Self> {
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(|id| Element { id: id.to_string() })
    }
}

/// Element location strategy
///
/// W3C drivers only know css, tag name, link text and xpath. Id and class
/// lookups are expressed as css selectors the same way common client
/// libraries do it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum By {
    Id(String),
    ClassName(String),
    TagName(String),
    Css(String),
    XPath(String),
}

impl By {
    pub fn id(id: &str) -> Self {
        By::Id(id.to_string())
    }

    pub fn class(class: &str) -> Self {
        By::ClassName(class.to_string())
    }

    pub fn tag(tag: &str) -> Self {
        By::TagName(tag.to_string())
    }

    pub fn css(selector: &str) -> Self {
        By::Css(selector.to_string())
    }

    /// Strategy name and value as sent on the wire
    pub fn to_wire(&self) -> (&'static str, String) {
        match self {
            By::Id(id) => ("css selector", format!("[id=\"{}\"]", escape_css(id))),
            By::ClassName(class) => ("css selector", format!(".{}", escape_css(class))),
            By::TagName(tag) => ("tag name", tag.clone()),
            By::Css(selector) => ("css selector", selector.clone()),
            By::XPath(path) => ("xpath", path.clone()),
        }
    }

    /// Request body for a find command
    pub fn to_body(&self) -> Value {
        let (using, value) = self.to_wire();
        serde_json::json!({ "using": using, "value": value })
    }
}

impl std::fmt::Display for By {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            By::Id(v) => write!(f, "#{}", v),
            By::ClassName(v) => write!(f, ".{}", v),
            By::TagName(v) => write!(f, "<{}>", v),
            By::Css(v) => write!(f, "css `{}`", v),
            By::XPath(v) => write!(f, "xpath `{}`", v),
        }
    }
}

fn escape_css(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '"' | '\\' | '.' | '#' | ':' | '[' | ']' | ' ' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_wire_format() {
        assert_eq!(
            By::id("webdav-sync-up").to_wire(),
            ("css selector", "[id=\"webdav-sync-up\"]".to_string())
        );
        assert_eq!(
            By::class("notice-container").to_wire(),
            ("css selector", ".notice-container".to_string())
        );
        assert_eq!(By::tag("button").to_wire(), ("tag name", "button".to_string()));
    }

    #[test]
    fn test_class_names_are_escaped() {
        assert_eq!(By::class("a:b").to_wire().1, ".a\\:b");
    }

    #[test]
    fn test_element_from_value() {
        let value = serde_json::json!({ ELEMENT_KEY: "f.1A2B.d.3C" });
        assert_eq!(
            Element::from_value(&value),
            Some(Element { id: "f.1A2B.d.3C".to_string() })
        );
        assert_eq!(Element::from_value(&serde_json::json!({})), None);
    }

    #[test]
    fn test_error_envelope() {
        let body = r#"{"value":{"error":"no such element","message":"Unable to locate element","stacktrace":""}}"#;
        let env: Envelope = serde_json::from_str(body).unwrap();
        let err: ErrorValue = serde_json::from_value(env.value).unwrap();
        assert_eq!(err.error, "no such element");
    }

    #[test]
    fn test_new_session() {
        let body = r#"{"value":{"sessionId":"abc123","capabilities":{"browserName":"chrome"}}}"#;
        let env: Envelope = serde_json::from_str(body).unwrap();
        let session: NewSession = serde_json::from_value(env.value).unwrap();
        assert_eq!(session.session_id, "abc123");
    }
}
