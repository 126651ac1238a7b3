//! Declarative feature catalog: activation order, criticality and the
//! cross-feature dependency table.

use crate::types::{Criticality, FeatureKey};
use serde::Serialize;

/// One dependency-injection rule: after both features are live, the provider's
/// shared handle is handed to the consumer under `slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DependencyRule {
    pub consumer: FeatureKey,
    pub provider: FeatureKey,
    pub slot: &'static str,
}

/// Cross-feature wiring applied by the feature manager.
pub const DEPENDENCY_RULES: &[DependencyRule] = &[
    DependencyRule {
        consumer: FeatureKey::TextSelection,
        provider: FeatureKey::SelectElement,
        slot: "select_element_manager",
    },
    DependencyRule {
        consumer: FeatureKey::TextFieldIcon,
        provider: FeatureKey::TextSelection,
        slot: "text_selection_manager",
    },
];

/// Rules in which `key` takes part, on either side.
pub fn rules_for(key: FeatureKey) -> impl Iterator<Item = &'static DependencyRule> {
    DEPENDENCY_RULES
        .iter()
        .filter(move |rule| rule.consumer == key || rule.provider == key)
}

/// Static description of one feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureDescriptor {
    pub key: FeatureKey,
    pub position: usize,
    pub criticality: Criticality,
    pub dependencies: Vec<DependencyRule>,
}

/// Descriptors for every feature, in activation order.
pub fn descriptors() -> Vec<FeatureDescriptor> {
    FeatureKey::ACTIVATION_ORDER
        .iter()
        .map(|key| FeatureDescriptor {
            key: *key,
            position: key.position(),
            criticality: key.criticality(),
            dependencies: DEPENDENCY_RULES
                .iter()
                .filter(|rule| rule.consumer == *key)
                .copied()
                .collect(),
        })
        .collect()
}
