//! Command and response envelopes.

use crate::error::EnvelopeError;
use crate::messaging::action::{MessageAction, MessageContext};
use crate::types::{deserialize_millis, now_millis};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unit of cross-context command.
///
/// `action` and `context` stay strings on the wire so that an envelope from a
/// newer sender still parses; the router decides whether it understands them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub action: String,
    #[serde(default)]
    pub data: Value,
    pub context: String,
    pub message_id: String,
    #[serde(deserialize_with = "deserialize_millis")]
    pub timestamp: i64,
}

impl MessageEnvelope {
    /// New envelope with a fresh message id and the current timestamp.
    pub fn new(action: MessageAction, data: Value, context: MessageContext) -> Self {
        Self {
            action: action.as_str().to_string(),
            data,
            context: context.as_str().to_string(),
            message_id: format!("{}-{}", context.as_str(), uuid::Uuid::new_v4()),
            timestamp: now_millis(),
        }
    }

    /// Validate an untyped JSON value at the receiving boundary.
    pub fn from_value(raw: &Value) -> Result<Self, EnvelopeError> {
        Ok(Self::deserialize(raw)?)
    }

    pub fn parsed_action(&self) -> Result<MessageAction, EnvelopeError> {
        self.action.parse()
    }
}

/// Who sent an envelope, as reported by the host runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSender {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// Unit of reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}
