//! Cross-frame wire schema.
//!
//! On the wire an envelope is `{type, frameId, timestamp, payload?}`. The
//! `type` string is the only trust boundary: anything outside the closed
//! [`CrossFrameKind`] set is rejected, and payloads are decoded into typed
//! structs before any receiver acts on them.

use crate::error::EnvelopeError;
use crate::types::{deserialize_millis, now_millis};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrossFrameKind {
    WindowRequest,
    IconRequest,
    OutsideClick,
    DismissRequest,
}

impl CrossFrameKind {
    pub const ALL: [CrossFrameKind; 4] = [
        CrossFrameKind::WindowRequest,
        CrossFrameKind::IconRequest,
        CrossFrameKind::OutsideClick,
        CrossFrameKind::DismissRequest,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WindowRequest => "window-request",
            Self::IconRequest => "icon-request",
            Self::OutsideClick => "outside-click",
            Self::DismissRequest => "dismiss-request",
        }
    }
}

impl fmt::Display for CrossFrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrossFrameKind {
    type Err = EnvelopeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| EnvelopeError::UnknownKind(value.to_string()))
    }
}

/// Viewport coordinates in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Shift by `offset`, e.g. from iframe viewport into top-frame viewport.
    pub fn translated(self, offset: Point) -> Self {
        Self {
            x: self.x + offset.x,
            y: self.y + offset.y,
        }
    }

    fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Ask the top frame to open the translation window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowRequest {
    pub text: String,
    pub position: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
}

/// Ask the top frame to show the selection icon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IconRequest {
    pub text: String,
    pub position: Point,
}

/// The user clicked somewhere a nested frame can see but the UI is not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutsideClick {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DismissRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Decoded, typed cross-frame message.
#[derive(Debug, Clone, PartialEq)]
pub enum CrossFrameMessage {
    WindowRequest(WindowRequest),
    IconRequest(IconRequest),
    OutsideClick(OutsideClick),
    DismissRequest(DismissRequest),
}

impl CrossFrameMessage {
    pub fn kind(&self) -> CrossFrameKind {
        match self {
            Self::WindowRequest(_) => CrossFrameKind::WindowRequest,
            Self::IconRequest(_) => CrossFrameKind::IconRequest,
            Self::OutsideClick(_) => CrossFrameKind::OutsideClick,
            Self::DismissRequest(_) => CrossFrameKind::DismissRequest,
        }
    }
}

/// Unit of frame-to-frame coordination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossFrameEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub frame_id: String,
    #[serde(deserialize_with = "deserialize_millis")]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl CrossFrameEnvelope {
    /// Wrap `message` for sending from `frame_id`.
    pub fn wrap(message: &CrossFrameMessage, frame_id: &str) -> Result<Self, serde_json::Error> {
        let payload = match message {
            CrossFrameMessage::WindowRequest(req) => serde_json::to_value(req)?,
            CrossFrameMessage::IconRequest(req) => serde_json::to_value(req)?,
            CrossFrameMessage::OutsideClick(click) => serde_json::to_value(click)?,
            CrossFrameMessage::DismissRequest(req) => serde_json::to_value(req)?,
        };
        Ok(Self {
            kind: message.kind().as_str().to_string(),
            frame_id: frame_id.to_string(),
            timestamp: now_millis(),
            payload: Some(payload),
        })
    }

    /// Parse and structurally validate an untrusted value.
    pub fn from_value(raw: &Value) -> Result<Self, EnvelopeError> {
        let envelope = Self::deserialize(raw)?;
        envelope.kind.parse::<CrossFrameKind>()?;
        if envelope.frame_id.trim().is_empty() {
            return Err(EnvelopeError::MissingFrameId);
        }
        Ok(envelope)
    }

    /// Decode the payload into the typed message for this envelope's kind.
    pub fn decode(&self) -> Result<CrossFrameMessage, EnvelopeError> {
        let kind: CrossFrameKind = self.kind.parse()?;
        let payload = self.payload.clone().unwrap_or(Value::Null);
        let invalid = |reason: String| EnvelopeError::InvalidPayload {
            kind: kind.as_str().to_string(),
            reason,
        };
        let message = match kind {
            CrossFrameKind::WindowRequest => {
                let req: WindowRequest =
                    serde_json::from_value(payload).map_err(|e| invalid(e.to_string()))?;
                if !req.position.is_finite() {
                    return Err(invalid("position is not finite".to_string()));
                }
                CrossFrameMessage::WindowRequest(req)
            }
            CrossFrameKind::IconRequest => {
                let req: IconRequest =
                    serde_json::from_value(payload).map_err(|e| invalid(e.to_string()))?;
                if !req.position.is_finite() {
                    return Err(invalid("position is not finite".to_string()));
                }
                CrossFrameMessage::IconRequest(req)
            }
            CrossFrameKind::OutsideClick => {
                if payload.is_null() {
                    CrossFrameMessage::OutsideClick(OutsideClick::default())
                } else {
                    CrossFrameMessage::OutsideClick(
                        serde_json::from_value(payload).map_err(|e| invalid(e.to_string()))?,
                    )
                }
            }
            CrossFrameKind::DismissRequest => {
                if payload.is_null() {
                    CrossFrameMessage::DismissRequest(DismissRequest::default())
                } else {
                    CrossFrameMessage::DismissRequest(
                        serde_json::from_value(payload).map_err(|e| invalid(e.to_string()))?,
                    )
                }
            }
        };
        Ok(message)
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
