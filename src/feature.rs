//! Feature lifecycle
//!
//! Decides which page features are eligible, activates and deactivates their
//! handlers, and keeps that decision consistent under concurrent triggers
//! (initial load, settings changes, URL changes, manual refresh).

pub mod catalog;
pub mod eligibility;
pub mod handler;
pub mod manager;
pub mod report;

pub use catalog::{descriptors, rules_for, DependencyRule, FeatureDescriptor, DEPENDENCY_RULES};
pub use eligibility::{ExclusionChecker, StaticExclusionChecker};
pub use handler::{FeatureFactory, FeatureHandler, SharedDependency};
pub use manager::{FeatureManager, ManagerStatus, PageSignals, SettingsChange};
pub use report::{EvaluationReport, FeatureOutcome, TransitionOutcome};
