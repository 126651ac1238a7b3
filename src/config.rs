//! Configuration System
//!
//! Layered configuration for the orchestrator, the frame coordinator and
//! logging. Sources are merged in order: built-in defaults, the global config
//! file, an explicit config file, then `PAGEWIRE__*` environment variables.

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PagewireConfig {
    /// Feature manager behavior
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Cross-frame coordination behavior
    #[serde(default)]
    pub frames: FramesConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Feature manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Quiet period before a re-evaluation pass starts; every new request
    /// restarts it.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Settings keys whose changes trigger re-evaluation. Changes to any other
    /// key are ignored.
    #[serde(default = "default_watched_settings")]
    pub watched_settings: Vec<String>,

    /// Re-evaluate when a single-page app changes its URL.
    #[serde(default = "default_true")]
    pub reevaluate_on_url_change: bool,
}

/// Upper bound accepted for `debounce_ms`.
pub const MAX_DEBOUNCE_MS: u64 = 5_000;

fn default_debounce_ms() -> u64 {
    100
}

fn default_watched_settings() -> Vec<String> {
    [
        "EXTENSION_ENABLED",
        "TRANSLATE_ON_TEXT_SELECTION",
        "TRANSLATE_WITH_SELECT_ELEMENT",
        "TRANSLATE_ON_TEXT_FIELDS",
        "ENABLE_SHORTCUT_FOR_TEXT_FIELDS",
        "EXCLUDED_SITES",
    ]
    .iter()
    .map(|key| key.to_string())
    .collect()
}

fn default_true() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            watched_settings: default_watched_settings(),
            reevaluate_on_url_change: default_true(),
        }
    }
}

impl OrchestratorConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Whether a change to `key` should trigger re-evaluation.
    pub fn watches(&self, key: &str) -> bool {
        self.watched_settings.iter().any(|watched| watched == key)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(format!(
                "debounce_ms must be at most {} (got {})",
                MAX_DEBOUNCE_MS, self.debounce_ms
            ));
        }
        let mut seen = HashSet::new();
        for key in &self.watched_settings {
            if key.trim().is_empty() {
                return Err("watched_settings cannot contain empty keys".to_string());
            }
            if !seen.insert(key.as_str()) {
                return Err(format!("watched_settings lists '{}' twice", key));
            }
        }
        Ok(())
    }
}

/// Cross-frame coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramesConfig {
    /// Dismiss the translation window when a click lands outside it.
    #[serde(default = "default_true")]
    pub dismiss_on_outside_click: bool,
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            dismiss_on_outside_click: default_true(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Orchestrator(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Orchestrator(msg) => write!(f, "Orchestrator: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl PagewireConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.orchestrator.validate() {
            errors.push(ValidationError::Orchestrator(e));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
