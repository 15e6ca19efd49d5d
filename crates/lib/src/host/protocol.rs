//! Host message types and the single decoding step shared by every consumer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::BridgeError;

/// Context pushed by the host: `{ "event"?, "data"?: { "contact"?, "currentAgent"? } }`.
/// Every level is optional; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundContext {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub data: Option<ContextData>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextData {
    #[serde(default)]
    pub contact: Option<Person>,
    #[serde(default)]
    pub current_agent: Option<Person>,
}

/// A contact or agent as the host describes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl InboundContext {
    /// Email of the person being chatted with, trimmed; None when absent or blank.
    pub fn contact_email(&self) -> Option<&str> {
        self.data
            .as_ref()?
            .contact
            .as_ref()?
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    pub fn contact_name(&self) -> Option<&str> {
        self.data.as_ref()?.contact.as_ref()?.name.as_deref()
    }

    pub fn agent_name(&self) -> Option<&str> {
        self.data.as_ref()?.current_agent.as_ref()?.name.as_deref()
    }
}

/// Decode a raw host message. Strings are parsed as JSON first; objects are taken as-is.
/// Anything else (numbers, arrays, null, ...) is a format error.
pub fn decode_host_message(raw: Value) -> Result<InboundContext, BridgeError> {
    let value = match raw {
        Value::String(text) => {
            serde_json::from_str::<Value>(&text).map_err(|e| BridgeError::Parse(e.to_string()))?
        }
        other => other,
    };
    if !value.is_object() {
        return Err(BridgeError::Format(format!(
            "expected an object, got {}",
            kind(&value)
        )));
    }
    serde_json::from_value(value).map_err(|e| BridgeError::Format(e.to_string()))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
