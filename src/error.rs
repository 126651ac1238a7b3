//! Error types for the pagewire orchestration layer.
//!
//! Each concern gets its own enum so that failures can be contained where they
//! happen: a feature that fails to activate never aborts an evaluation pass, a
//! handler failure becomes a `{success: false}` response, and a transport
//! failure is swallowed by the frame coordinator.

use crate::types::FeatureKey;
use thiserror::Error;

/// Top-level orchestrator errors.
///
/// This is the only error a caller of `FeatureManager::reevaluate_features`
/// can observe. Per-feature failures are reported inside the evaluation report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("Feature manager has shut down")]
    ShutDown,

    #[error("Evaluation pass aborted: {0}")]
    PassAborted(String),
}

/// Failures installing the tracing subscriber.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoggingError {
    #[error("Invalid logging configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to open log file: {0}")]
    LogFile(String),

    #[error("Failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Failures raised by feature handlers and the feature factory.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeatureError {
    #[error("Activation failed: {0}")]
    ActivationFailed(String),

    #[error("Deactivation failed: {0}")]
    DeactivationFailed(String),

    #[error("No handler can be built for feature '{0}'")]
    Unavailable(FeatureKey),

    #[error("Feature manager has shut down")]
    ManagerShutDown,

    #[error("Extension context invalidated: {0}")]
    ContextInvalidated(String),
}

/// Failures raised by the eligibility oracle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EligibilityError {
    #[error("Exclusion checker unavailable: {0}")]
    Unavailable(String),

    #[error("Extension context invalidated: {0}")]
    ContextInvalidated(String),
}

/// Failure returned by a message handler.
///
/// `already_handled` is set when an upstream error-reporting path has already
/// surfaced this failure; the router then records it quietly instead of logging
/// it a second time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
    pub already_handled: bool,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            already_handled: false,
        }
    }

    /// Tag the error as already reported.
    pub fn mark_handled(mut self) -> Self {
        self.already_handled = true;
        self
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::new(format!("Invalid message data: {}", err))
    }
}

impl From<FeatureError> for HandlerError {
    fn from(err: FeatureError) -> Self {
        HandlerError::new(err.to_string())
    }
}

impl From<OrchestratorError> for HandlerError {
    fn from(err: OrchestratorError) -> Self {
        HandlerError::new(err.to_string())
    }
}

/// Failure delivering a response envelope back to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RespondError {
    #[error("Response channel closed: {0}")]
    ChannelClosed(String),

    #[error("Response already sent")]
    AlreadySent,
}

/// Cross-frame transport failures. Always swallowed by the coordinator.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to post cross-frame message: {0}")]
    PostFailed(String),

    #[error("Failed to serialize cross-frame message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failures of the privileged runtime binding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error("Extension context invalidated during {operation}")]
    ContextInvalidated { operation: String },

    #[error("Extension runtime unreachable: {0}")]
    RuntimeUnreachable(String),
}

/// Malformed or unrecognized wire envelopes, rejected at the receiving boundary.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown message action: {0}")]
    UnknownAction(String),

    #[error("Unknown cross-frame message type: {0}")]
    UnknownKind(String),

    #[error("Cross-frame envelope is missing a frame id")]
    MissingFrameId,

    #[error("Invalid payload for '{kind}': {reason}")]
    InvalidPayload { kind: String, reason: String },
}

/// Failures surfaced by the diagnostic CLI.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("Failed to start async runtime: {0}")]
    Runtime(String),
}

/// Text carried by a caught panic payload.
pub(crate) fn panic_payload(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
