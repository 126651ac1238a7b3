//! Feature handler contract, produced by this crate and implemented by
//! concrete page features.

use crate::error::FeatureError;
use crate::types::FeatureKey;
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

/// Type-erased handle a feature shares with the features that depend on it.
pub type SharedDependency = Arc<dyn Any + Send + Sync>;

/// A live page feature.
///
/// The feature manager owns exactly one handler per feature key. Handlers must
/// not call back into `activate_feature`/`deactivate_feature` from inside
/// `activate` or `deactivate`; transitions are serialized.
#[async_trait]
pub trait FeatureHandler: Send + Sync {
    /// Start the feature. `Ok(false)` declines activation and the handler is
    /// discarded without being recorded as active.
    async fn activate(&mut self) -> Result<bool, FeatureError>;

    /// Stop the feature and release everything it holds. The manager removes
    /// the handler afterwards whatever this returns.
    async fn deactivate(&mut self) -> Result<bool, FeatureError>;

    /// Handle exposed to dependent features (the feature's inner manager).
    fn shared(&self) -> Option<SharedDependency> {
        None
    }

    /// Receive (or, with `None`, lose) a dependency in the named slot.
    /// Returns whether the slot is known to this handler.
    fn inject(&mut self, _slot: &str, _dependency: Option<SharedDependency>) -> bool {
        false
    }
}

/// Builds handlers on first eligible activation.
pub trait FeatureFactory: Send + Sync {
    /// Construct the handler for `key`, or fetch its singleton.
    fn create(&self, key: FeatureKey) -> Result<Box<dyn FeatureHandler>, FeatureError>;

    /// Drop any singleton the factory keeps for `key`. Called before the
    /// handler is deactivated and whenever a built handler is discarded.
    fn release_singleton(&self, _key: FeatureKey) {}
}
