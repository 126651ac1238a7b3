//! pagewire: page feature orchestration for browser extensions
//!
//! Decides which page-level features run in a browsing context and keeps
//! that decision consistent under asynchronous triggers, routes commands
//! between extension contexts, coordinates the shared UI across frames and
//! guards every privileged call against an invalidated extension runtime.

pub mod cli;
pub mod config;
pub mod error;
pub mod feature;
pub mod frames;
pub mod guard;
pub mod logging;
pub mod messaging;
pub mod page;
pub mod resources;
pub mod types;

pub use config::{ConfigLoader, PagewireConfig};
pub use error::{
    EligibilityError, EnvelopeError, FeatureError, GuardError, HandlerError, LoggingError,
    OrchestratorError, RespondError, TransportError,
};
pub use feature::{
    EvaluationReport, ExclusionChecker, FeatureFactory, FeatureHandler, FeatureManager,
    PageSignals, TransitionOutcome,
};
pub use frames::{CrossFrameCoordinator, FrameTransport, TopFrameUi};
pub use guard::{ExtensionContextGuard, RuntimeBinding};
pub use messaging::{MessageAction, MessageEnvelope, MessageRouter, ResponseEnvelope};
pub use page::{PageContext, PageServices};
pub use resources::ResourceTracker;
pub use types::{Criticality, FeatureKey};
