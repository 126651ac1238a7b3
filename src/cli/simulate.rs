//! In-memory page for `pagewire simulate`: stub features, a static oracle and
//! a top frame with no UI attached.

use crate::error::{FeatureError, TransportError};
use crate::feature::{FeatureFactory, FeatureHandler, SharedDependency};
use crate::frames::FrameTransport;
use crate::types::FeatureKey;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// How a simulated feature behaves on activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubBehavior {
    Activate,
    Decline,
    Fail,
}

pub struct StubFeature {
    key: FeatureKey,
    behavior: StubBehavior,
    injected: BTreeSet<&'static str>,
}

#[async_trait]
impl FeatureHandler for StubFeature {
    async fn activate(&mut self) -> Result<bool, FeatureError> {
        match self.behavior {
            StubBehavior::Activate => Ok(true),
            StubBehavior::Decline => Ok(false),
            StubBehavior::Fail => Err(FeatureError::ActivationFailed(format!(
                "{} was told to fail",
                self.key
            ))),
        }
    }

    async fn deactivate(&mut self) -> Result<bool, FeatureError> {
        Ok(true)
    }

    fn shared(&self) -> Option<SharedDependency> {
        Some(Arc::new(self.key))
    }

    fn inject(&mut self, slot: &str, dependency: Option<SharedDependency>) -> bool {
        let known = match slot {
            "select_element_manager" => "select_element_manager",
            "text_selection_manager" => "text_selection_manager",
            _ => return false,
        };
        if dependency.is_some() {
            self.injected.insert(known);
        } else {
            self.injected.remove(known);
        }
        debug!(feature = %self.key, slot, attached = dependency.is_some(), "Stub dependency slot updated");
        true
    }
}

#[derive(Debug, Default)]
pub struct StubFactory {
    failing: BTreeSet<FeatureKey>,
    declining: BTreeSet<FeatureKey>,
}

impl StubFactory {
    pub fn new(
        failing: impl IntoIterator<Item = FeatureKey>,
        declining: impl IntoIterator<Item = FeatureKey>,
    ) -> Self {
        Self {
            failing: failing.into_iter().collect(),
            declining: declining.into_iter().collect(),
        }
    }

    fn behavior(&self, key: FeatureKey) -> StubBehavior {
        if self.failing.contains(&key) {
            StubBehavior::Fail
        } else if self.declining.contains(&key) {
            StubBehavior::Decline
        } else {
            StubBehavior::Activate
        }
    }
}

impl FeatureFactory for StubFactory {
    fn create(&self, key: FeatureKey) -> Result<Box<dyn FeatureHandler>, FeatureError> {
        Ok(Box::new(StubFeature {
            key,
            behavior: self.behavior(key),
            injected: BTreeSet::new(),
        }))
    }
}

/// Top-frame transport that never needs to post.
#[derive(Debug, Default)]
pub struct TopFrameTransport;

impl FrameTransport for TopFrameTransport {
    fn is_top_frame(&self) -> bool {
        true
    }

    fn post_to_top(&self, _message: Value) -> Result<(), TransportError> {
        Err(TransportError::PostFailed(
            "top frame has no parent".to_string(),
        ))
    }
}
