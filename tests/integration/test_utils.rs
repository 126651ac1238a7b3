//! Shared test utilities for integration tests
//!
//! Environment isolation for config tests, plus recording doubles for the
//! collaborator traits: feature factory, exclusion oracle, frame transport and
//! UI surface.

use async_trait::async_trait;
use pagewire::config::OrchestratorConfig;
use pagewire::error::{EligibilityError, FeatureError, TransportError};
use pagewire::feature::{
    ExclusionChecker, FeatureFactory, FeatureHandler, FeatureManager, PageSignals,
    SharedDependency,
};
use pagewire::frames::{DismissReason, FrameTransport, IconRequest, TopFrameUi, WindowRequest};
use pagewire::types::FeatureKey;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

struct EnvState {
    vars: Vec<(&'static str, Option<String>)>,
}

impl EnvState {
    fn capture(names: &[&'static str]) -> Self {
        Self {
            vars: names
                .iter()
                .map(|name| (*name, std::env::var(name).ok()))
                .collect(),
        }
    }

    fn restore(self) {
        for (name, value) in self.vars {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }
}

/// Run `f` with XDG_CONFIG_HOME and HOME pointing into `test_dir`, and with
/// `env` applied. Everything is restored afterwards.
pub fn with_isolated_env<F, R>(test_dir: &TempDir, env: &[(&'static str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let mut names = vec!["HOME", "XDG_CONFIG_HOME"];
    names.extend(env.iter().map(|(name, _)| *name));
    let env_state = EnvState::capture(&names);

    let config_home = test_dir.path().join("config");
    let home = test_dir.path().join("home");
    std::fs::create_dir_all(&config_home).unwrap();
    std::fs::create_dir_all(&home).unwrap();
    std::env::set_var("HOME", &home);
    std::env::set_var("XDG_CONFIG_HOME", &config_home);
    for (name, value) in env {
        std::env::set_var(name, value);
    }

    let result = f();
    env_state.restore();
    result
}

/// Ordered log of everything the doubles observed.
#[derive(Default)]
pub struct Journal {
    events: Mutex<Vec<String>>,
    built: Mutex<BTreeMap<FeatureKey, usize>>,
}

impl Journal {
    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    pub fn built(&self, key: FeatureKey) -> usize {
        self.built.lock().get(&key).copied().unwrap_or(0)
    }
}

pub struct RecordingFeature {
    key: FeatureKey,
    journal: Arc<Journal>,
    fail: bool,
    decline: bool,
    activation_delay: Option<Duration>,
}

#[async_trait]
impl FeatureHandler for RecordingFeature {
    async fn activate(&mut self) -> Result<bool, FeatureError> {
        if let Some(delay) = self.activation_delay {
            tokio::time::sleep(delay).await;
        }
        self.journal.push(format!("activate:{}", self.key));
        if self.fail {
            return Err(FeatureError::ActivationFailed(format!("{} exploded", self.key)));
        }
        Ok(!self.decline)
    }

    async fn deactivate(&mut self) -> Result<bool, FeatureError> {
        self.journal.push(format!("deactivate:{}", self.key));
        Ok(true)
    }

    fn shared(&self) -> Option<SharedDependency> {
        Some(Arc::new(self.key))
    }

    fn inject(&mut self, slot: &str, dependency: Option<SharedDependency>) -> bool {
        let provider = dependency
            .and_then(|dep| dep.downcast_ref::<FeatureKey>().copied())
            .map(|key| key.to_string())
            .unwrap_or_else(|| "none".to_string());
        self.journal
            .push(format!("inject:{}:{}={}", self.key, slot, provider));
        true
    }
}

#[derive(Default)]
pub struct RecordingFactory {
    pub journal: Arc<Journal>,
    failing: Mutex<BTreeSet<FeatureKey>>,
    declining: Mutex<BTreeSet<FeatureKey>>,
    activation_delay: Mutex<Option<Duration>>,
}

impl RecordingFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, key: FeatureKey) {
        self.failing.lock().insert(key);
    }

    pub fn decline(&self, key: FeatureKey) {
        self.declining.lock().insert(key);
    }

    pub fn delay_activation(&self, delay: Duration) {
        *self.activation_delay.lock() = Some(delay);
    }
}

impl FeatureFactory for RecordingFactory {
    fn create(&self, key: FeatureKey) -> Result<Box<dyn FeatureHandler>, FeatureError> {
        *self.journal.built.lock().entry(key).or_default() += 1;
        Ok(Box::new(RecordingFeature {
            key,
            journal: self.journal.clone(),
            fail: self.failing.lock().contains(&key),
            decline: self.declining.lock().contains(&key),
            activation_delay: *self.activation_delay.lock(),
        }))
    }

    fn release_singleton(&self, key: FeatureKey) {
        self.journal.push(format!("release:{}", key));
    }
}

/// Oracle with a mutable deny list, an optional failing key and a call
/// counter.
#[derive(Default)]
pub struct ScriptedChecker {
    denied: Mutex<BTreeSet<FeatureKey>>,
    erroring: Mutex<BTreeSet<FeatureKey>>,
    panicking: Mutex<Option<FeatureKey>>,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl ScriptedChecker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deny(&self, key: FeatureKey) {
        self.denied.lock().insert(key);
    }

    pub fn allow(&self, key: FeatureKey) {
        self.denied.lock().remove(&key);
    }

    pub fn error_on(&self, key: FeatureKey) {
        self.erroring.lock().insert(key);
    }

    /// Panic the next time `key` is checked.
    pub fn panic_once(&self, key: FeatureKey) {
        *self.panicking.lock() = Some(key);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl ExclusionChecker for ScriptedChecker {
    async fn is_feature_allowed(&self, feature: FeatureKey) -> Result<bool, EligibilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let armed = *self.panicking.lock() == Some(feature);
        if armed {
            self.panicking.lock().take();
            panic!("exclusion rules corrupted");
        }
        if self.erroring.lock().contains(&feature) {
            return Err(EligibilityError::Unavailable("settings not loaded".to_string()));
        }
        Ok(!self.denied.lock().contains(&feature))
    }

    async fn update_url(&self, url: &str) -> Result<(), EligibilityError> {
        self.urls.lock().push(url.to_string());
        Ok(())
    }
}

pub fn orchestrator_config(debounce_ms: u64) -> OrchestratorConfig {
    OrchestratorConfig {
        debounce_ms,
        ..OrchestratorConfig::default()
    }
}

pub fn manager(
    checker: Arc<ScriptedChecker>,
    factory: Arc<RecordingFactory>,
    debounce_ms: u64,
) -> FeatureManager {
    FeatureManager::new(
        checker,
        factory,
        PageSignals::default(),
        orchestrator_config(debounce_ms),
    )
}

/// Transport that records posted envelopes, or fails every post.
pub struct RecordingTransport {
    top: bool,
    fail: AtomicBool,
    posted: Mutex<Vec<Value>>,
}

impl RecordingTransport {
    pub fn top() -> Arc<Self> {
        Arc::new(Self::with_role(true))
    }

    pub fn nested() -> Arc<Self> {
        Arc::new(Self::with_role(false))
    }

    fn with_role(top: bool) -> Self {
        Self {
            top,
            fail: AtomicBool::new(false),
            posted: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_posts(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn posted(&self) -> Vec<Value> {
        self.posted.lock().clone()
    }
}

impl FrameTransport for RecordingTransport {
    fn is_top_frame(&self) -> bool {
        self.top
    }

    fn post_to_top(&self, message: Value) -> Result<(), TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::PostFailed(
                "Blocked a frame from accessing a cross-origin frame".to_string(),
            ));
        }
        self.posted.lock().push(message);
        Ok(())
    }
}

/// UI surface that records calls and tracks visibility.
#[derive(Default)]
pub struct RecordingUi {
    visible: AtomicBool,
    pinned: AtomicBool,
    windows: Mutex<Vec<WindowRequest>>,
    icons: Mutex<Vec<IconRequest>>,
    dismissals: Mutex<Vec<DismissReason>>,
}

impl RecordingUi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    pub fn set_pinned(&self, pinned: bool) {
        self.pinned.store(pinned, Ordering::SeqCst);
    }

    pub fn windows(&self) -> Vec<WindowRequest> {
        self.windows.lock().clone()
    }

    pub fn icons(&self) -> Vec<IconRequest> {
        self.icons.lock().clone()
    }

    pub fn dismissals(&self) -> Vec<DismissReason> {
        self.dismissals.lock().clone()
    }
}

impl TopFrameUi for RecordingUi {
    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    fn is_pinned(&self) -> bool {
        self.pinned.load(Ordering::SeqCst)
    }

    fn show_window(&self, request: WindowRequest) {
        self.visible.store(true, Ordering::SeqCst);
        self.windows.lock().push(request);
    }

    fn show_icon(&self, request: IconRequest) {
        self.icons.lock().push(request);
    }

    fn dismiss(&self, reason: DismissReason) {
        self.visible.store(false, Ordering::SeqCst);
        self.dismissals.lock().push(reason);
    }
}
