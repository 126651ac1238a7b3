//! CLI presentation: text and json formatters per command.

mod decode;
mod features;
mod simulate;

pub use decode::{format_decode_json, format_decode_text, DecodeSummary};
pub use features::{format_features_json, format_features_text};
pub use simulate::{format_simulation_json, format_simulation_text, SimulationResult};
