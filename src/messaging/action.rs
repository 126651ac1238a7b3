//! Closed action and context vocabularies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every command a page context understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageAction {
    Ping,
    GetFeatureStatus,
    RefreshFeatures,
    SettingsUpdated,
    ShowTranslationWindow,
    DismissTranslationWindow,
}

impl MessageAction {
    pub const ALL: [MessageAction; 6] = [
        MessageAction::Ping,
        MessageAction::GetFeatureStatus,
        MessageAction::RefreshFeatures,
        MessageAction::SettingsUpdated,
        MessageAction::ShowTranslationWindow,
        MessageAction::DismissTranslationWindow,
    ];

    /// Wire name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::GetFeatureStatus => "getFeatureStatus",
            Self::RefreshFeatures => "refreshFeatures",
            Self::SettingsUpdated => "settingsUpdated",
            Self::ShowTranslationWindow => "showTranslationWindow",
            Self::DismissTranslationWindow => "dismissTranslationWindow",
        }
    }
}

impl fmt::Display for MessageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageAction {
    type Err = crate::error::EnvelopeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| crate::error::EnvelopeError::UnknownAction(value.to_string()))
    }
}

/// Execution context that produced an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageContext {
    Background,
    Content,
    Popup,
    Sidepanel,
    Options,
    Offscreen,
}

impl MessageContext {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::Content => "content",
            Self::Popup => "popup",
            Self::Sidepanel => "sidepanel",
            Self::Options => "options",
            Self::Offscreen => "offscreen",
        }
    }
}

impl fmt::Display for MessageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
