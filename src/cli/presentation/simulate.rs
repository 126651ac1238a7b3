//! Simulation formatters.

use crate::error::CliError;
use crate::feature::{EvaluationReport, ManagerStatus, TransitionOutcome};
use comfy_table::Table;
use serde::Serialize;

/// What `pagewire simulate` observed.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    pub frame_id: String,
    pub report: Option<EvaluationReport>,
    pub status: ManagerStatus,
    /// Actions with no handler in the simulated content context.
    pub unhandled_actions: Vec<String>,
}

pub fn format_simulation_text(result: &SimulationResult) -> String {
    let mut out = format!("Frame: {}\n", result.frame_id);
    let Some(report) = &result.report else {
        out.push_str("No evaluation pass ran (extension context invalid or already initialized).\n");
        return out;
    };

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Feature", "Eligible", "Outcome"]);
    for outcome in &report.outcomes {
        let text = match &outcome.outcome {
            TransitionOutcome::Activated => "activated".to_string(),
            TransitionOutcome::Deactivated => "deactivated".to_string(),
            TransitionOutcome::Unchanged => "unchanged".to_string(),
            TransitionOutcome::Declined => "declined".to_string(),
            TransitionOutcome::Failed { error } => format!("failed: {}", error),
        };
        table.add_row(vec![
            outcome.feature.to_string(),
            if outcome.eligible { "yes" } else { "no" }.to_string(),
            text,
        ]);
    }
    out.push_str(&table.to_string());
    out.push('\n');

    let active: Vec<String> = result.status.active.iter().map(|k| k.to_string()).collect();
    out.push_str(&format!(
        "Pass {} ({} ms), active: {}\n",
        report.pass,
        report.duration_ms,
        if active.is_empty() {
            "none".to_string()
        } else {
            active.join(", ")
        }
    ));
    if !result.unhandled_actions.is_empty() {
        out.push_str(&format!(
            "Actions left to feature handlers: {}\n",
            result.unhandled_actions.join(", ")
        ));
    }
    out
}

pub fn format_simulation_json(result: &SimulationResult) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(result)?)
}
