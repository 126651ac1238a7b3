//! Feature catalog formatters.

use crate::error::CliError;
use crate::feature::FeatureDescriptor;
use comfy_table::Table;

pub fn format_features_text(descriptors: &[FeatureDescriptor]) -> String {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["#", "Feature", "Criticality", "Receives"]);
    for descriptor in descriptors {
        let receives = if descriptor.dependencies.is_empty() {
            "-".to_string()
        } else {
            descriptor
                .dependencies
                .iter()
                .map(|rule| format!("{} <- {}", rule.slot, rule.provider))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let criticality = serde_json::to_value(descriptor.criticality)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default();
        table.add_row(vec![
            (descriptor.position + 1).to_string(),
            descriptor.key.to_string(),
            criticality,
            receives,
        ]);
    }
    table.to_string()
}

pub fn format_features_json(descriptors: &[FeatureDescriptor]) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(descriptors)?)
}
