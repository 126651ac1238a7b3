//! Envelope validation formatters.

use crate::error::CliError;
use serde::Serialize;

/// Outcome of validating one envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum DecodeSummary {
    Accepted {
        /// Action name or cross-frame type.
        kind: String,
        /// Message id or sending frame id.
        id: String,
        /// Decoded payload, pretty-printed.
        detail: String,
    },
    Rejected {
        reason: String,
    },
}

pub fn format_decode_text(summary: &DecodeSummary) -> String {
    match summary {
        DecodeSummary::Accepted { kind, id, detail } => {
            format!("Accepted: {}\n  id: {}\n{}", kind, id, detail)
        }
        DecodeSummary::Rejected { reason } => format!("Rejected: {}", reason),
    }
}

pub fn format_decode_json(summary: &DecodeSummary) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(summary)?)
}
