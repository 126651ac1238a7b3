//! CLI domain: parse, route, output, and presentation only.
//! No domain orchestration; single route table dispatches to domain services.

mod output;
mod parse;
mod presentation;
mod route;
mod simulate;

pub use output::map_error;
pub use parse::{Cli, Commands, EnvelopeKind};
pub use presentation::{DecodeSummary, SimulationResult};
pub use route::RunContext;
pub use simulate::{StubBehavior, StubFactory, StubFeature, TopFrameTransport};
