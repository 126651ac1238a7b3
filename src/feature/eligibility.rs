//! Eligibility oracle consumed by the feature manager.

use crate::error::EligibilityError;
use crate::types::FeatureKey;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeSet;

/// Answers whether a feature may run on the current page under current settings.
#[async_trait]
pub trait ExclusionChecker: Send + Sync {
    /// One-time setup before the first evaluation pass.
    async fn initialize(&self) -> Result<(), EligibilityError> {
        Ok(())
    }

    /// Consulted once per feature per evaluation pass.
    async fn is_feature_allowed(&self, feature: FeatureKey) -> Result<bool, EligibilityError>;

    /// Called when a single-page app navigates, before re-evaluation.
    async fn update_url(&self, _url: &str) -> Result<(), EligibilityError> {
        Ok(())
    }
}

/// In-memory oracle with an explicit deny list.
///
/// Used by the diagnostic CLI and by hosts that resolve exclusions up front.
#[derive(Debug, Default)]
pub struct StaticExclusionChecker {
    denied: RwLock<BTreeSet<FeatureKey>>,
}

impl StaticExclusionChecker {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn denying(features: impl IntoIterator<Item = FeatureKey>) -> Self {
        Self {
            denied: RwLock::new(features.into_iter().collect()),
        }
    }

    pub fn deny(&self, feature: FeatureKey) {
        self.denied.write().insert(feature);
    }

    pub fn allow(&self, feature: FeatureKey) {
        self.denied.write().remove(&feature);
    }
}

#[async_trait]
impl ExclusionChecker for StaticExclusionChecker {
    async fn is_feature_allowed(&self, feature: FeatureKey) -> Result<bool, EligibilityError> {
        Ok(!self.denied.read().contains(&feature))
    }
}
