//! Per-context message router.
//!
//! One async handler per action. Registration is last-write-wins; dispatch
//! always answers a registered action exactly once, whether the handler
//! succeeds, fails or panics.

use crate::error::{panic_payload, EnvelopeError, HandlerError, RespondError};
use crate::guard::ExtensionContextGuard;
use crate::messaging::action::{MessageAction, MessageContext};
use crate::messaging::envelope::{MessageEnvelope, MessageSender, ResponseEnvelope};
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

pub type HandlerResult = Result<Value, HandlerError>;

/// Async handler for one action.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, envelope: &MessageEnvelope, sender: &MessageSender) -> HandlerResult;
}

struct FnHandler<F> {
    handler: F,
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(MessageEnvelope, MessageSender) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, envelope: &MessageEnvelope, sender: &MessageSender) -> HandlerResult {
        (self.handler)(envelope.clone(), sender.clone()).await
    }
}

/// Wrap an async closure as a [`MessageHandler`].
pub fn handler_fn<F, Fut>(handler: F) -> Arc<dyn MessageHandler>
where
    F: Fn(MessageEnvelope, MessageSender) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler { handler })
}

/// Action → handler registry for one execution context.
pub struct MessageRouter {
    context: MessageContext,
    handlers: RwLock<HashMap<MessageAction, Arc<dyn MessageHandler>>>,
}

impl MessageRouter {
    pub fn new(context: MessageContext) -> Self {
        Self {
            context,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> MessageContext {
        self.context
    }

    /// Register `handler` for `action`, replacing any previous registration.
    /// Returns `true` when an earlier handler was replaced.
    pub fn register_handler(&self, action: MessageAction, handler: Arc<dyn MessageHandler>) -> bool {
        let replaced = self.handlers.write().insert(action, handler).is_some();
        if replaced {
            warn!(
                context = %self.context,
                action = %action,
                "Handler already registered for action, overwriting"
            );
        } else {
            debug!(context = %self.context, action = %action, "Registered message handler");
        }
        replaced
    }

    /// Register an async closure for `action`.
    pub fn register_fn<F, Fut>(&self, action: MessageAction, handler: F) -> bool
    where
        F: Fn(MessageEnvelope, MessageSender) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register_handler(action, handler_fn(handler))
    }

    pub fn unregister_handler(&self, action: MessageAction) -> bool {
        self.handlers.write().remove(&action).is_some()
    }

    pub fn is_registered(&self, action: MessageAction) -> bool {
        self.handlers.read().contains_key(&action)
    }

    pub fn registered_actions(&self) -> Vec<MessageAction> {
        let mut actions: Vec<_> = self.handlers.read().keys().copied().collect();
        actions.sort();
        actions
    }

    /// Actions of the closed set that have no handler in this context.
    pub fn missing_actions(&self) -> Vec<MessageAction> {
        let handlers = self.handlers.read();
        MessageAction::ALL
            .iter()
            .copied()
            .filter(|action| !handlers.contains_key(action))
            .collect()
    }

    /// Dispatch one envelope.
    ///
    /// Returns `false` (and never calls `respond`) when the action is unknown
    /// or unregistered. Otherwise calls `respond` exactly once and returns
    /// `true`, even if `respond` itself fails.
    pub async fn handle_message<R>(
        &self,
        envelope: &MessageEnvelope,
        sender: &MessageSender,
        respond: R,
    ) -> bool
    where
        R: FnOnce(ResponseEnvelope) -> Result<(), RespondError>,
    {
        let action = match envelope.parsed_action() {
            Ok(action) => action,
            Err(_) => {
                trace!(context = %self.context, action = %envelope.action, "Ignoring unknown action");
                return false;
            }
        };
        let handler = self.handlers.read().get(&action).cloned();
        let Some(handler) = handler else {
            trace!(context = %self.context, action = %action, "No handler registered");
            return false;
        };

        let outcome = AssertUnwindSafe(handler.handle(envelope, sender))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(HandlerError::new(format!(
                    "Handler panicked: {}",
                    panic_payload(panic.as_ref())
                )))
            });

        let response = match outcome {
            Ok(data) => ResponseEnvelope::ok(data),
            Err(err) => {
                self.report_failure(action, envelope, &err);
                ResponseEnvelope::failure(err.message)
            }
        };

        if let Err(err) = respond(response) {
            warn!(
                context = %self.context,
                action = %action,
                message_id = %envelope.message_id,
                error = %err,
                "Failed to send response"
            );
        }
        true
    }

    /// Validate an untyped JSON envelope, then dispatch it.
    /// Malformed envelopes are not handled.
    pub async fn handle_raw<R>(&self, raw: &Value, sender: &MessageSender, respond: R) -> bool
    where
        R: FnOnce(ResponseEnvelope) -> Result<(), RespondError>,
    {
        match MessageEnvelope::from_value(raw) {
            Ok(envelope) => self.handle_message(&envelope, sender, respond).await,
            Err(err) => {
                debug!(context = %self.context, error = %err, "Rejected malformed envelope");
                false
            }
        }
    }

    fn report_failure(&self, action: MessageAction, envelope: &MessageEnvelope, err: &HandlerError) {
        if err.already_handled || ExtensionContextGuard::is_context_error_message(&err.message) {
            debug!(
                context = %self.context,
                action = %action,
                message_id = %envelope.message_id,
                error = %err,
                "Message handler failed (already reported)"
            );
        } else {
            error!(
                context = %self.context,
                action = %action,
                message_id = %envelope.message_id,
                error = %err,
                "Message handler failed"
            );
        }
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("context", &self.context)
            .field("actions", &self.registered_actions())
            .finish()
    }
}

impl From<EnvelopeError> for HandlerError {
    fn from(err: EnvelopeError) -> Self {
        HandlerError::new(err.to_string())
    }
}
