//! Page context
//!
//! One `PageContext` per browsing context, built once at content-script
//! startup and passed by reference to whatever needs it. It owns the context
//! guard, the message router, the cross-frame coordinator and the feature
//! manager, and registers the core message handlers that tie them together.

use crate::config::{OrchestratorConfig, PagewireConfig};
use crate::error::{HandlerError, OrchestratorError, RespondError};
use crate::feature::{
    EvaluationReport, ExclusionChecker, FeatureFactory, FeatureManager, PageSignals,
    SettingsChange,
};
use crate::frames::{
    CrossFrameCoordinator, Delivery, FrameSource, FrameTransport, TopFrameUi, WindowRequest,
};
use crate::guard::{ExtensionContextGuard, RuntimeBinding};
use crate::messaging::{
    HandlerResult, MessageAction, MessageContext, MessageEnvelope, MessageRouter, MessageSender,
    ResponseEnvelope,
};
use crate::types::now_millis;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Host collaborators a page context is built from.
#[derive(Clone)]
pub struct PageServices {
    pub binding: Arc<dyn RuntimeBinding>,
    pub checker: Arc<dyn ExclusionChecker>,
    pub factory: Arc<dyn FeatureFactory>,
    pub transport: Arc<dyn FrameTransport>,
    /// Shared UI surface; only honored in the top frame.
    pub ui: Option<Arc<dyn TopFrameUi>>,
}

pub struct PageContext {
    guard: Arc<ExtensionContextGuard>,
    router: Arc<MessageRouter>,
    frames: Arc<CrossFrameCoordinator>,
    features: Arc<RwLock<FeatureManager>>,
    signals: PageSignals,
    checker: Arc<dyn ExclusionChecker>,
    factory: Arc<dyn FeatureFactory>,
    orchestrator: OrchestratorConfig,
}

impl PageContext {
    pub fn new(services: PageServices, config: &PagewireConfig) -> Self {
        let signals = PageSignals::default();
        let guard = Arc::new(ExtensionContextGuard::new(services.binding));
        let frames = Arc::new(CrossFrameCoordinator::new(
            services.transport,
            services.ui,
            config.frames.clone(),
        ));
        let features = FeatureManager::new(
            services.checker.clone(),
            services.factory.clone(),
            signals.clone(),
            config.orchestrator.clone(),
        );
        let page = Self {
            guard,
            router: Arc::new(MessageRouter::new(MessageContext::Content)),
            frames,
            features: Arc::new(RwLock::new(features)),
            signals,
            checker: services.checker,
            factory: services.factory,
            orchestrator: config.orchestrator.clone(),
        };
        page.register_core_handlers();
        page
    }

    pub fn guard(&self) -> &ExtensionContextGuard {
        &self.guard
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn frames(&self) -> &CrossFrameCoordinator {
        &self.frames
    }

    /// Current feature manager. A handle taken before
    /// [`Self::reset_feature_manager`] keeps pointing at the old one.
    pub fn features(&self) -> FeatureManager {
        self.features.read().clone()
    }

    pub fn signals(&self) -> &PageSignals {
        &self.signals
    }

    /// Initialize the feature manager, unless the extension context is
    /// already gone.
    pub async fn start(&self) -> Result<Option<EvaluationReport>, OrchestratorError> {
        let features = self.features();
        let report = self
            .guard
            .run_guarded("feature initialization", || features.initialize())
            .await?;
        Ok(report.flatten())
    }

    /// Dispatch an inbound command envelope. Returns whether it was handled.
    pub async fn dispatch<R>(&self, raw: &Value, sender: &MessageSender, respond: R) -> bool
    where
        R: FnOnce(ResponseEnvelope) -> Result<(), RespondError>,
    {
        if !self.guard.is_valid_sync() {
            debug!("Extension context invalid, ignoring inbound message");
            return false;
        }
        self.router.handle_raw(raw, sender, respond).await
    }

    /// Hand a frame-to-frame envelope to the coordinator.
    pub fn receive_frame_message(&self, raw: &Value, source: FrameSource) -> Delivery {
        self.frames.receive(raw, source)
    }

    /// Replace the feature manager with a fresh, uninitialized one after
    /// shutting the current one down.
    pub async fn reset_feature_manager(&self) -> FeatureManager {
        let previous = self.features();
        previous.cleanup().await;
        let fresh = FeatureManager::new(
            self.checker.clone(),
            self.factory.clone(),
            self.signals.clone(),
            self.orchestrator.clone(),
        );
        *self.features.write() = fresh.clone();
        info!("Feature manager reset");
        fresh
    }

    pub async fn shutdown(&self) {
        self.features().cleanup().await;
        info!(frame_id = %self.frames.frame_id(), "Page context shut down");
    }

    fn register_core_handlers(&self) {
        let frames = self.frames.clone();
        self.router.register_fn(MessageAction::Ping, move |envelope, _sender| {
            ping(frames.clone(), envelope)
        });

        let features = self.features.clone();
        self.router
            .register_fn(MessageAction::GetFeatureStatus, move |_envelope, _sender| {
                feature_status(features.read().clone())
            });

        let features = self.features.clone();
        self.router
            .register_fn(MessageAction::RefreshFeatures, move |envelope, _sender| {
                refresh_features(features.read().clone(), envelope)
            });

        let signals = self.signals.clone();
        self.router
            .register_fn(MessageAction::SettingsUpdated, move |envelope, _sender| {
                apply_settings(signals.clone(), envelope)
            });

        let frames = self.frames.clone();
        self.router
            .register_fn(MessageAction::ShowTranslationWindow, move |envelope, _sender| {
                show_window(frames.clone(), envelope)
            });

        let frames = self.frames.clone();
        self.router
            .register_fn(MessageAction::DismissTranslationWindow, move |envelope, _sender| {
                dismiss_window(frames.clone(), envelope)
            });
    }
}

async fn ping(frames: Arc<CrossFrameCoordinator>, envelope: MessageEnvelope) -> HandlerResult {
    Ok(json!({
        "pong": true,
        "messageId": envelope.message_id,
        "frameId": frames.frame_id(),
        "topFrame": frames.is_top_frame(),
        "timestamp": now_millis(),
    }))
}

async fn feature_status(manager: FeatureManager) -> HandlerResult {
    Ok(serde_json::to_value(manager.status())?)
}

async fn refresh_features(manager: FeatureManager, envelope: MessageEnvelope) -> HandlerResult {
    let reason = envelope
        .data
        .get("reason")
        .and_then(Value::as_str)
        .map(|reason| format!("refresh:{}", reason))
        .unwrap_or_else(|| format!("refresh:{}", envelope.context));
    let report = manager.reevaluate_features(reason).await?;
    Ok(serde_json::to_value(report)?)
}

async fn apply_settings(signals: PageSignals, envelope: MessageEnvelope) -> HandlerResult {
    let changes = settings_changes(&envelope.data)?;
    let count = changes.len();
    for change in changes {
        signals.settings_changed(change.key, change.value);
    }
    Ok(json!({ "changes": count }))
}

async fn show_window(frames: Arc<CrossFrameCoordinator>, envelope: MessageEnvelope) -> HandlerResult {
    let request: WindowRequest = serde_json::from_value(envelope.data)?;
    frames.request_window(request);
    Ok(json!({ "requested": true }))
}

async fn dismiss_window(frames: Arc<CrossFrameCoordinator>, envelope: MessageEnvelope) -> HandlerResult {
    let reason = envelope
        .data
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_string);
    frames.request_dismiss(reason);
    Ok(json!({ "requested": true }))
}

impl std::fmt::Debug for PageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageContext")
            .field("frames", &self.frames)
            .field("router", &self.router)
            .field("features", &self.features())
            .finish()
    }
}

#[derive(Deserialize)]
struct SingleSetting {
    key: String,
    #[serde(default)]
    value: Value,
}

/// Accepts `{key, value}` or a map of changed keys to new values.
fn settings_changes(data: &Value) -> Result<Vec<SettingsChange>, HandlerError> {
    if data.get("key").is_some() {
        let single = SingleSetting::deserialize(data)?;
        return Ok(vec![SettingsChange::new(single.key, single.value)]);
    }
    match data {
        Value::Object(map) => Ok(map
            .iter()
            .map(|(key, value)| SettingsChange::new(key.clone(), value.clone()))
            .collect()),
        _ => Err(HandlerError::new("settingsUpdated expects an object")),
    }
}
