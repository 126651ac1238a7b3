//! Shared identifiers: the closed set of page features and their policy.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Page-level feature key.
///
/// Declaration order is the activation priority order: the message-routing
/// feature first, selection and window features next, input-affecting
/// features last. `Ord` follows that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureKey {
    ContentMessageHandler,
    WindowsManager,
    TextSelection,
    SelectElement,
    Shortcut,
    TextFieldIcon,
}

impl FeatureKey {
    /// Fixed activation order used by every evaluation pass.
    pub const ACTIVATION_ORDER: [FeatureKey; 6] = [
        FeatureKey::ContentMessageHandler,
        FeatureKey::WindowsManager,
        FeatureKey::TextSelection,
        FeatureKey::SelectElement,
        FeatureKey::Shortcut,
        FeatureKey::TextFieldIcon,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContentMessageHandler => "content-message-handler",
            Self::WindowsManager => "windows-manager",
            Self::TextSelection => "text-selection",
            Self::SelectElement => "select-element",
            Self::Shortcut => "shortcut",
            Self::TextFieldIcon => "text-field-icon",
        }
    }

    /// Zero-based position in the activation order.
    pub fn position(self) -> usize {
        Self::ACTIVATION_ORDER
            .iter()
            .position(|key| *key == self)
            .unwrap_or(Self::ACTIVATION_ORDER.len())
    }

    /// Memory-pressure policy for this feature.
    pub fn criticality(self) -> Criticality {
        match self {
            // Every current feature keeps the page usable; none is shed under pressure.
            Self::ContentMessageHandler
            | Self::WindowsManager
            | Self::TextSelection
            | Self::SelectElement
            | Self::Shortcut
            | Self::TextFieldIcon => Criticality::Critical,
        }
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureKey {
    type Err = UnknownFeature;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        Self::ACTIVATION_ORDER
            .iter()
            .copied()
            .find(|key| key.as_str() == normalized)
            .ok_or_else(|| UnknownFeature(normalized.to_string()))
    }
}

/// Parse failure for a feature key string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFeature(pub String);

impl fmt::Display for UnknownFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown feature key: {}", self.0)
    }
}

impl std::error::Error for UnknownFeature {}

/// Whether a feature may be shed under memory pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    /// Needed for UX continuity; never deactivated by smart cleanup.
    Critical,
    /// May be deactivated by smart cleanup.
    Optional,
}

/// Current time as Unix milliseconds, the timestamp unit of every envelope.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Deserialize an envelope timestamp.
///
/// Page scripts produce `performance.now()`-style values with a fractional
/// part, so any finite JSON number is accepted and truncated to whole
/// milliseconds.
pub fn deserialize_millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct MillisVisitor;

    impl<'de> Visitor<'de> for MillisVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a timestamp in milliseconds")
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<i64, E> {
            Ok(value)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<i64, E> {
            i64::try_from(value).map_err(|_| E::custom(format!("timestamp {} out of range", value)))
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<i64, E> {
            if !value.is_finite() || value.abs() >= i64::MAX as f64 {
                return Err(E::custom(format!("timestamp {} out of range", value)));
            }
            Ok(value.trunc() as i64)
        }
    }

    deserializer.deserialize_any(MillisVisitor)
}
