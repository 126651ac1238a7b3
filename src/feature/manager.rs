//! Feature Manager
//!
//! Owns exactly one handler per active feature and keeps the active set in
//! step with the eligibility oracle. Re-evaluation requests go through a
//! single-consumer channel: one worker debounces, drains the queue, runs one
//! pass in activation order and resolves every drained request with the same
//! report. Direct activate/deactivate calls and passes are serialized by a
//! transition lock; the state lock is never held across an await.

use crate::config::OrchestratorConfig;
use crate::error::{panic_payload, FeatureError, OrchestratorError};
use crate::feature::catalog::rules_for;
use crate::feature::eligibility::ExclusionChecker;
use crate::feature::handler::{FeatureFactory, FeatureHandler, SharedDependency};
use crate::feature::report::{EvaluationReport, FeatureOutcome, TransitionOutcome};
use crate::guard::ExtensionContextGuard;
use crate::resources::ResourceTracker;
use crate::types::{Criticality, FeatureKey};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

const SIGNAL_CAPACITY: usize = 64;

/// A settings-store change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsChange {
    pub key: String,
    pub value: Value,
}

impl SettingsChange {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Page-level signal sources the manager listens to: settings changes and
/// single-page-app URL changes.
#[derive(Debug, Clone)]
pub struct PageSignals {
    settings: broadcast::Sender<SettingsChange>,
    url: broadcast::Sender<String>,
}

impl PageSignals {
    pub fn new(capacity: usize) -> Self {
        let (settings, _) = broadcast::channel(capacity);
        let (url, _) = broadcast::channel(capacity);
        Self { settings, url }
    }

    /// Publish a settings change. Returns how many listeners received it.
    pub fn settings_changed(&self, key: impl Into<String>, value: Value) -> usize {
        self.settings
            .send(SettingsChange::new(key, value))
            .unwrap_or(0)
    }

    pub fn url_changed(&self, url: impl Into<String>) -> usize {
        self.url.send(url.into()).unwrap_or(0)
    }

    pub fn subscribe_settings(&self) -> broadcast::Receiver<SettingsChange> {
        self.settings.subscribe()
    }

    pub fn subscribe_url(&self) -> broadcast::Receiver<String> {
        self.url.subscribe()
    }
}

impl Default for PageSignals {
    fn default() -> Self {
        Self::new(SIGNAL_CAPACITY)
    }
}

/// Point-in-time view of the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerStatus {
    pub initialized: bool,
    pub shut_down: bool,
    pub active: Vec<FeatureKey>,
    pub handlers: Vec<FeatureKey>,
    pub passes_completed: u64,
    pub pass_in_progress: bool,
    pub pending_requests: usize,
}

impl ManagerStatus {
    /// Every active feature has a handler and every handler is active.
    pub fn is_consistent(&self) -> bool {
        self.active == self.handlers
    }
}

type PassResult = Result<EvaluationReport, OrchestratorError>;

struct EvaluationRequest {
    reason: String,
    responder: oneshot::Sender<PassResult>,
}

struct EvaluationQueue {
    sender: mpsc::UnboundedSender<EvaluationRequest>,
    worker: JoinHandle<()>,
}

#[derive(Default)]
struct ManagerState {
    active: BTreeSet<FeatureKey>,
    handlers: BTreeMap<FeatureKey, Box<dyn FeatureHandler>>,
    initialized: bool,
    shut_down: bool,
    passes_completed: u64,
    pass_in_progress: bool,
}

struct ManagerInner {
    checker: Arc<dyn ExclusionChecker>,
    factory: Arc<dyn FeatureFactory>,
    signals: PageSignals,
    config: OrchestratorConfig,
    state: Mutex<ManagerState>,
    transition: tokio::sync::Mutex<()>,
    queue: Mutex<Option<EvaluationQueue>>,
    pending: AtomicUsize,
    resources: ResourceTracker,
}

/// Per-page feature lifecycle orchestrator. Cheap to clone; clones share
/// state.
#[derive(Clone)]
pub struct FeatureManager {
    inner: Arc<ManagerInner>,
}

impl FeatureManager {
    pub fn new(
        checker: Arc<dyn ExclusionChecker>,
        factory: Arc<dyn FeatureFactory>,
        signals: PageSignals,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                checker,
                factory,
                signals,
                config,
                state: Mutex::new(ManagerState::default()),
                transition: tokio::sync::Mutex::new(()),
                queue: Mutex::new(None),
                pending: AtomicUsize::new(0),
                resources: ResourceTracker::new("feature-manager"),
            }),
        }
    }

    /// Initialize the oracle, run the first pass and subscribe to page
    /// signals.
    ///
    /// Returns `None` when the manager was already initialized.
    pub async fn initialize(&self) -> Result<Option<EvaluationReport>, OrchestratorError> {
        {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                return Err(OrchestratorError::ShutDown);
            }
            if state.initialized {
                debug!("Feature manager already initialized");
                return Ok(None);
            }
            state.initialized = true;
        }

        if let Err(err) = self.inner.checker.initialize().await {
            warn!(error = %err, "Exclusion checker initialization failed");
        }

        let report = match self
            .inner
            .run_pass_guarded(vec!["initialize".to_string()])
            .await
        {
            Ok(report) => report,
            Err(err) => {
                // Leave the manager retryable; signals are not subscribed yet.
                self.inner.state.lock().initialized = false;
                warn!(error = %err, "Initial evaluation pass failed");
                return Err(err);
            }
        };
        self.subscribe_signals();

        info!(
            active = ?self.active_features(),
            duration_ms = report.duration_ms,
            "Feature manager initialized"
        );
        Ok(Some(report))
    }

    /// Activate `key` if it is not active yet.
    ///
    /// `Ok(true)` when the feature is active afterwards, `Ok(false)` when its
    /// handler declined. Errors leave the feature inactive.
    pub async fn activate_feature(&self, key: FeatureKey) -> Result<bool, FeatureError> {
        let _transition = self.inner.transition.lock().await;
        self.inner.activate_locked(key).await
    }

    /// Deactivate `key`. `Ok(false)` when it was not active.
    ///
    /// The handler and the active flag are removed even when the handler's
    /// own deactivation fails; that failure is returned afterwards.
    pub async fn deactivate_feature(&self, key: FeatureKey) -> Result<bool, FeatureError> {
        let _transition = self.inner.transition.lock().await;
        self.inner.deactivate_locked(key).await
    }

    /// Request a re-evaluation pass and wait for the pass that serves it.
    ///
    /// Requests made within one debounce window share a single pass and
    /// receive the same report. Per-feature failures are reported inside the
    /// report and never turn into an error here.
    pub async fn reevaluate_features(
        &self,
        reason: impl Into<String>,
    ) -> Result<EvaluationReport, OrchestratorError> {
        let reason = reason.into();
        debug!(reason = %reason, "Re-evaluation requested");
        let receiver = self.inner.submit(reason)?;
        receiver.await.map_err(|_| OrchestratorError::ShutDown)?
    }

    /// Fire-and-forget variant of [`Self::reevaluate_features`].
    pub fn enqueue(&self, reason: impl Into<String>) {
        self.inner.enqueue(reason.into());
    }

    /// Ask the oracle whether `key` may run. Oracle failures count as "no".
    pub async fn should_activate_feature(&self, key: FeatureKey) -> bool {
        self.inner.should_activate(key).await
    }

    /// Shed optional features under memory pressure. Critical features are
    /// never touched. Returns the features that were deactivated.
    pub async fn perform_smart_cleanup(&self) -> Vec<FeatureKey> {
        let _transition = self.inner.transition.lock().await;
        let candidates: Vec<FeatureKey> = self
            .inner
            .state
            .lock()
            .active
            .iter()
            .rev()
            .copied()
            .filter(|key| key.criticality() == Criticality::Optional)
            .collect();

        let mut released = Vec::new();
        for key in candidates {
            match self.inner.deactivate_locked(key).await {
                Ok(_) => released.push(key),
                Err(err) => {
                    warn!(feature = %key, error = %err, "Smart cleanup deactivation failed");
                    released.push(key);
                }
            }
        }
        info!(released = ?released, "Smart cleanup complete");
        released
    }

    /// Shut down: stop the worker, drop listeners and deactivate every
    /// feature, newest first. Queued re-evaluation requests resolve with
    /// [`OrchestratorError::ShutDown`]. Idempotent.
    pub async fn cleanup(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
        }
        let queue = self.inner.queue.lock().take();

        // Waits for a running pass to finish.
        let _transition = self.inner.transition.lock().await;
        if let Some(queue) = queue {
            queue.worker.abort();
        }
        self.inner.pending.store(0, Ordering::SeqCst);
        let listeners = self.inner.resources.cleanup();

        let active: Vec<FeatureKey> = self.inner.state.lock().active.iter().rev().copied().collect();
        for key in &active {
            if let Err(err) = self.inner.deactivate_locked(*key).await {
                warn!(feature = %key, error = %err, "Feature deactivation failed during cleanup");
            }
        }
        let stale: Vec<FeatureKey> = self.inner.state.lock().handlers.keys().copied().collect();
        for key in stale {
            self.inner.purge_stale(key).await;
        }

        info!(
            deactivated = active.len(),
            listeners,
            "Feature manager shut down"
        );
    }

    pub fn active_features(&self) -> Vec<FeatureKey> {
        self.inner.state.lock().active.iter().copied().collect()
    }

    pub fn is_feature_active(&self, key: FeatureKey) -> bool {
        self.inner.state.lock().active.contains(&key)
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state.lock().initialized
    }

    pub fn status(&self) -> ManagerStatus {
        let state = self.inner.state.lock();
        ManagerStatus {
            initialized: state.initialized,
            shut_down: state.shut_down,
            active: state.active.iter().copied().collect(),
            handlers: state.handlers.keys().copied().collect(),
            passes_completed: state.passes_completed,
            pass_in_progress: state.pass_in_progress,
            pending_requests: self.inner.pending.load(Ordering::SeqCst),
        }
    }

    /// Read access to a live handler. `f` runs under the state lock and must
    /// not call back into the manager.
    pub fn with_handler<R>(&self, key: FeatureKey, f: impl FnOnce(&dyn FeatureHandler) -> R) -> Option<R> {
        let state = self.inner.state.lock();
        state.handlers.get(&key).map(|handler| f(handler.as_ref()))
    }

    /// Shared handle exposed by a live feature.
    pub fn shared(&self, key: FeatureKey) -> Option<SharedDependency> {
        self.with_handler(key, |handler| handler.shared()).flatten()
    }

    pub fn signals(&self) -> &PageSignals {
        &self.inner.signals
    }

    fn subscribe_signals(&self) {
        let weak = Arc::downgrade(&self.inner);
        let lagged = weak.clone();
        let config = self.inner.config.clone();
        self.inner.resources.add_event_listener_with_lag(
            "settings-change",
            self.inner.signals.subscribe_settings(),
            move |change: SettingsChange| {
                if config.watches(&change.key) {
                    if let Some(inner) = weak.upgrade() {
                        debug!(key = %change.key, "Watched setting changed");
                        inner.enqueue(format!("settings-change:{}", change.key));
                    }
                } else {
                    trace!(key = %change.key, "Ignoring unwatched setting change");
                }
                futures::future::ready(())
            },
            // Dropped changes may have included a watched key.
            move |_skipped| {
                if let Some(inner) = lagged.upgrade() {
                    inner.enqueue("settings-lagged".to_string());
                }
            },
        );

        if self.inner.config.reevaluate_on_url_change {
            let weak = Arc::downgrade(&self.inner);
            self.inner.resources.add_event_listener(
                "url-change",
                self.inner.signals.subscribe_url(),
                move |url: String| {
                    let weak = weak.clone();
                    async move {
                        let Some(inner) = weak.upgrade() else {
                            return;
                        };
                        if let Err(err) = inner.checker.update_url(&url).await {
                            warn!(url = %url, error = %err, "Exclusion checker rejected URL update");
                        }
                        inner.enqueue("url-change".to_string());
                    }
                },
            );
        }
    }

    #[cfg(test)]
    fn insert_stale_handler(&self, key: FeatureKey, handler: Box<dyn FeatureHandler>) {
        self.inner.state.lock().handlers.insert(key, handler);
    }
}

impl std::fmt::Debug for FeatureManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureManager")
            .field("status", &self.status())
            .finish()
    }
}

impl ManagerInner {
    fn submit(self: &Arc<Self>, reason: String) -> Result<oneshot::Receiver<PassResult>, OrchestratorError> {
        let (responder, receiver) = oneshot::channel();
        let mut queue = self.queue.lock();
        if self.state.lock().shut_down {
            return Err(OrchestratorError::ShutDown);
        }
        let queue = queue
            .get_or_insert_with(|| EvaluationQueue::spawn(Arc::downgrade(self), self.config.debounce()));
        self.pending.fetch_add(1, Ordering::SeqCst);
        if queue
            .sender
            .send(EvaluationRequest { reason, responder })
            .is_err()
        {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(OrchestratorError::ShutDown);
        }
        Ok(receiver)
    }

    fn enqueue(self: &Arc<Self>, reason: String) {
        if let Err(err) = self.submit(reason) {
            debug!(error = %err, "Re-evaluation request dropped");
        }
    }

    async fn should_activate(&self, key: FeatureKey) -> bool {
        match self.checker.is_feature_allowed(key).await {
            Ok(allowed) => allowed,
            Err(err) => {
                if ExtensionContextGuard::is_context_error(&err) {
                    debug!(feature = %key, error = %err, "Eligibility unknown, context invalidated");
                } else {
                    warn!(feature = %key, error = %err, "Eligibility check failed, treating as ineligible");
                }
                false
            }
        }
    }

    async fn run_pass_guarded(&self, reasons: Vec<String>) -> PassResult {
        match AssertUnwindSafe(self.run_pass(reasons)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                self.state.lock().pass_in_progress = false;
                let message = panic_payload(panic.as_ref());
                error!(error = %message, "Evaluation pass aborted");
                Err(OrchestratorError::PassAborted(message))
            }
        }
    }

    async fn run_pass(&self, reasons: Vec<String>) -> PassResult {
        let _transition = self.transition.lock().await;
        let pass = {
            let mut state = self.state.lock();
            if state.shut_down {
                return Err(OrchestratorError::ShutDown);
            }
            state.pass_in_progress = true;
            state.passes_completed + 1
        };
        let started = Instant::now();
        debug!(pass, reasons = ?reasons, "Evaluation pass started");

        let mut outcomes = Vec::with_capacity(FeatureKey::ACTIVATION_ORDER.len());
        for key in FeatureKey::ACTIVATION_ORDER {
            let eligible = self.should_activate(key).await;
            let is_active = self.state.lock().active.contains(&key);
            let outcome = match (eligible, is_active) {
                (true, false) => match self.activate_locked(key).await {
                    Ok(true) => TransitionOutcome::Activated,
                    Ok(false) => TransitionOutcome::Declined,
                    Err(err) => TransitionOutcome::Failed {
                        error: err.to_string(),
                    },
                },
                (false, true) => match self.deactivate_locked(key).await {
                    Ok(_) => TransitionOutcome::Deactivated,
                    Err(err) => TransitionOutcome::Failed {
                        error: err.to_string(),
                    },
                },
                (false, false) => {
                    self.purge_stale(key).await;
                    TransitionOutcome::Unchanged
                }
                (true, true) => TransitionOutcome::Unchanged,
            };
            outcomes.push(FeatureOutcome {
                feature: key,
                eligible,
                outcome,
            });
        }

        let report = {
            let mut state = self.state.lock();
            state.pass_in_progress = false;
            state.passes_completed = pass;
            EvaluationReport {
                pass,
                reasons,
                outcomes,
                duration_ms: started.elapsed().as_millis(),
            }
        };
        info!(
            pass,
            changed = report.changed().count(),
            failed = report.failures().count(),
            duration_ms = report.duration_ms,
            "Evaluation pass complete"
        );
        Ok(report)
    }

    /// Caller holds the transition lock.
    async fn activate_locked(&self, key: FeatureKey) -> Result<bool, FeatureError> {
        {
            let state = self.state.lock();
            if state.shut_down {
                return Err(FeatureError::ManagerShutDown);
            }
            if state.active.contains(&key) {
                trace!(feature = %key, "Feature already active");
                return Ok(true);
            }
        }
        self.purge_stale(key).await;

        let mut handler = self.factory.create(key).map_err(|err| {
            error!(feature = %key, error = %err, "Failed to build feature handler");
            err
        })?;
        let result = AssertUnwindSafe(handler.activate())
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(FeatureError::ActivationFailed(format!(
                    "handler panicked: {}",
                    panic_payload(panic.as_ref())
                )))
            });

        match result {
            Ok(true) => {
                let mut state = self.state.lock();
                state.handlers.insert(key, handler);
                state.active.insert(key);
                inject_dependencies(&mut state, key);
                info!(feature = %key, "Feature activated");
                Ok(true)
            }
            Ok(false) => {
                self.factory.release_singleton(key);
                debug!(feature = %key, "Feature declined activation");
                Ok(false)
            }
            Err(err) => {
                self.factory.release_singleton(key);
                if ExtensionContextGuard::is_context_error(&err) {
                    debug!(feature = %key, error = %err, "Feature activation hit invalidated context");
                } else {
                    error!(feature = %key, error = %err, "Feature activation failed");
                }
                Err(err)
            }
        }
    }

    /// Caller holds the transition lock.
    async fn deactivate_locked(&self, key: FeatureKey) -> Result<bool, FeatureError> {
        let removed = {
            let mut state = self.state.lock();
            if state.active.remove(&key) {
                let handler = state.handlers.remove(&key);
                detach_dependents(&mut state, key);
                Some(handler)
            } else {
                None
            }
        };
        let Some(handler) = removed else {
            self.purge_stale(key).await;
            trace!(feature = %key, "Feature not active");
            return Ok(false);
        };

        self.factory.release_singleton(key);
        let Some(mut handler) = handler else {
            warn!(feature = %key, "Active feature had no handler");
            return Ok(true);
        };
        match deactivate_handler(handler.as_mut()).await {
            Ok(clean) => {
                if !clean {
                    debug!(feature = %key, "Handler reported an unclean deactivation");
                }
                info!(feature = %key, "Feature deactivated");
                Ok(true)
            }
            Err(err) => {
                warn!(feature = %key, error = %err, "Feature deactivation failed, handler discarded");
                Err(err)
            }
        }
    }

    /// Deactivate and drop a handler that has no active flag.
    async fn purge_stale(&self, key: FeatureKey) {
        let stale = {
            let mut state = self.state.lock();
            if state.active.contains(&key) {
                return;
            }
            let stale = state.handlers.remove(&key);
            if stale.is_some() {
                detach_dependents(&mut state, key);
            }
            stale
        };
        let Some(mut stale) = stale else {
            return;
        };
        warn!(feature = %key, "Discarding stale handler without active flag");
        self.factory.release_singleton(key);
        if let Err(err) = deactivate_handler(stale.as_mut()).await {
            debug!(feature = %key, error = %err, "Stale handler failed to deactivate");
        }
    }
}

impl EvaluationQueue {
    fn spawn(inner: Weak<ManagerInner>, debounce: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_evaluation_worker(inner, receiver, debounce));
        Self { sender, worker }
    }
}

async fn run_evaluation_worker(
    inner: Weak<ManagerInner>,
    mut receiver: mpsc::UnboundedReceiver<EvaluationRequest>,
    debounce: Duration,
) {
    while let Some(first) = receiver.recv().await {
        let mut batch = vec![first];

        // Every new request restarts the quiet period.
        loop {
            tokio::select! {
                next = receiver.recv() => match next {
                    Some(request) => batch.push(request),
                    None => return,
                },
                _ = tokio::time::sleep(debounce) => break,
            }
        }

        let Some(manager) = inner.upgrade() else {
            return;
        };
        manager.pending.fetch_sub(batch.len(), Ordering::SeqCst);
        let (reasons, responders): (Vec<String>, Vec<_>) = batch
            .into_iter()
            .map(|request| (request.reason, request.responder))
            .unzip();
        debug!(coalesced = responders.len(), "Running coalesced evaluation pass");

        let result = manager.run_pass_guarded(reasons).await;
        drop(manager);
        for responder in responders {
            // The caller may have stopped waiting.
            let _ = responder.send(result.clone());
        }
    }
}

async fn deactivate_handler(handler: &mut dyn FeatureHandler) -> Result<bool, FeatureError> {
    AssertUnwindSafe(handler.deactivate())
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            Err(FeatureError::DeactivationFailed(format!(
                "handler panicked: {}",
                panic_payload(panic.as_ref())
            )))
        })
}

/// Wire `key` to every live partner, as consumer and as provider.
fn inject_dependencies(state: &mut ManagerState, key: FeatureKey) {
    for rule in rules_for(key) {
        if !(state.active.contains(&rule.consumer) && state.active.contains(&rule.provider)) {
            continue;
        }
        let Some(dependency) = state
            .handlers
            .get(&rule.provider)
            .and_then(|provider| provider.shared())
        else {
            debug!(provider = %rule.provider, "Provider exposes no shared handle");
            continue;
        };
        if let Some(consumer) = state.handlers.get_mut(&rule.consumer) {
            if consumer.inject(rule.slot, Some(dependency)) {
                debug!(
                    consumer = %rule.consumer,
                    provider = %rule.provider,
                    slot = rule.slot,
                    "Injected feature dependency"
                );
            } else {
                warn!(
                    consumer = %rule.consumer,
                    slot = rule.slot,
                    "Consumer does not accept dependency slot"
                );
            }
        }
    }
}

/// Withdraw `provider`'s shared handle from its consumers.
fn detach_dependents(state: &mut ManagerState, provider: FeatureKey) {
    for rule in rules_for(provider).filter(|rule| rule.provider == provider) {
        if let Some(consumer) = state.handlers.get_mut(&rule.consumer) {
            consumer.inject(rule.slot, None);
            debug!(consumer = %rule.consumer, slot = rule.slot, "Detached feature dependency");
        }
    }
}
