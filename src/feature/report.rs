//! Evaluation pass results.

use crate::types::FeatureKey;
use serde::Serialize;

/// What one pass did to one feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum TransitionOutcome {
    Activated,
    Deactivated,
    Unchanged,
    /// The handler returned `false` from `activate`.
    Declined,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureOutcome {
    pub feature: FeatureKey,
    pub eligible: bool,
    #[serde(flatten)]
    pub outcome: TransitionOutcome,
}

/// Result shared by every request coalesced into one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationReport {
    /// 1-based sequence number of the pass.
    pub pass: u64,
    /// Reasons of every request served by this pass, in arrival order.
    pub reasons: Vec<String>,
    pub outcomes: Vec<FeatureOutcome>,
    pub duration_ms: u128,
}

impl EvaluationReport {
    pub fn outcome_for(&self, feature: FeatureKey) -> Option<&TransitionOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.feature == feature)
            .map(|o| &o.outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = &FeatureOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, TransitionOutcome::Failed { .. }))
    }

    /// True when no feature failed during the pass.
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn changed(&self) -> impl Iterator<Item = &FeatureOutcome> {
        self.outcomes.iter().filter(|o| {
            matches!(
                o.outcome,
                TransitionOutcome::Activated | TransitionOutcome::Deactivated
            )
        })
    }
}
