//! Extension context guard
//!
//! The binding between a content context and the extension's privileged
//! runtime can be invalidated at any moment (extension reload, update or
//! disable). Privileged calls made afterwards fail with a characteristic
//! error. The guard lets callers skip such calls up front and classify the
//! failures that slip through, so the host page keeps working.

use crate::error::GuardError;
use async_trait::async_trait;
use std::error::Error;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Message fragments (lowercase) that identify an invalidated runtime binding.
const CONTEXT_ERROR_PATTERNS: &[&str] = &[
    "extension context invalidated",
    "context invalidated",
    "extension runtime is unavailable",
    "message port closed before a response was received",
    "receiving end does not exist",
];

/// Handle on the privileged runtime binding.
#[async_trait]
pub trait RuntimeBinding: Send + Sync {
    /// Runtime id while the binding is alive, `None` once it is gone.
    fn runtime_id(&self) -> Option<String>;

    /// Round-trip check against the runtime.
    async fn ping(&self) -> Result<(), GuardError> {
        match self.runtime_id() {
            Some(_) => Ok(()),
            None => Err(GuardError::ContextInvalidated {
                operation: "ping".to_string(),
            }),
        }
    }
}

/// Binding whose validity is flipped by hand. Used by the diagnostic CLI and tests.
#[derive(Debug)]
pub struct ManualRuntimeBinding {
    runtime_id: String,
    valid: AtomicBool,
}

impl ManualRuntimeBinding {
    pub fn new(runtime_id: impl Into<String>) -> Self {
        Self {
            runtime_id: runtime_id.into(),
            valid: AtomicBool::new(true),
        }
    }

    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    pub fn restore(&self) {
        self.valid.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RuntimeBinding for ManualRuntimeBinding {
    fn runtime_id(&self) -> Option<String> {
        self.valid
            .load(Ordering::SeqCst)
            .then(|| self.runtime_id.clone())
    }
}

/// Validity gate consulted before every privileged operation.
pub struct ExtensionContextGuard {
    binding: Arc<dyn RuntimeBinding>,
    invalidated: AtomicBool,
}

impl ExtensionContextGuard {
    pub fn new(binding: Arc<dyn RuntimeBinding>) -> Self {
        Self {
            binding,
            invalidated: AtomicBool::new(false),
        }
    }

    /// Fast synchronous check. Once an invalidation has been observed the
    /// guard stays closed: a binding never comes back within one document.
    pub fn is_valid_sync(&self) -> bool {
        if self.invalidated.load(Ordering::Acquire) {
            return false;
        }
        matches!(self.binding.runtime_id(), Some(id) if !id.is_empty())
    }

    /// Synchronous check followed by a round trip to the runtime.
    pub async fn is_valid(&self) -> bool {
        if !self.is_valid_sync() {
            return false;
        }
        match self.binding.ping().await {
            Ok(()) => true,
            Err(err) => {
                if Self::is_context_error(&err) {
                    self.mark_invalidated();
                } else {
                    warn!(error = %err, "Extension runtime ping failed");
                }
                false
            }
        }
    }

    /// Latch the invalidated state.
    pub fn mark_invalidated(&self) {
        if !self.invalidated.swap(true, Ordering::AcqRel) {
            debug!("Extension context invalidated, privileged operations disabled");
        }
    }

    /// Whether `err` (or anything in its source chain) is the expected
    /// invalidated-context failure rather than a genuine fault.
    pub fn is_context_error(err: &(dyn Error + 'static)) -> bool {
        let mut current: Option<&(dyn Error + 'static)> = Some(err);
        while let Some(error) = current {
            if let Some(guard_error) = error.downcast_ref::<GuardError>() {
                if matches!(guard_error, GuardError::ContextInvalidated { .. }) {
                    return true;
                }
            }
            if Self::is_context_error_message(&error.to_string()) {
                return true;
            }
            current = error.source();
        }
        false
    }

    /// Message-only classification, for errors that crossed a serialization
    /// boundary as plain strings.
    pub fn is_context_error_message(message: &str) -> bool {
        let lowered = message.to_lowercase();
        CONTEXT_ERROR_PATTERNS
            .iter()
            .any(|pattern| lowered.contains(pattern))
    }

    /// Run a privileged operation behind the guard.
    ///
    /// Returns `Ok(None)` without calling `operation` when the context is
    /// already invalid, and `Ok(None)` when the operation fails with a context
    /// error (latching invalidation). Any other error is passed through.
    pub async fn run_guarded<T, E, F, Fut>(
        &self,
        operation: &str,
        run: F,
    ) -> Result<Option<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        if !self.is_valid_sync() {
            debug!(operation, "Skipping privileged operation, extension context is invalid");
            return Ok(None);
        }
        match run().await {
            Ok(value) => Ok(Some(value)),
            Err(err) if Self::is_context_error(&err) => {
                self.mark_invalidated();
                debug!(operation, error = %err, "Privileged operation hit invalidated context");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for ExtensionContextGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionContextGuard")
            .field("invalidated", &self.invalidated.load(Ordering::Relaxed))
            .finish()
    }
}
