//! CLI route: single route table and run context. Dispatches to domain services and presentation.

use crate::cli::parse::{Commands, EnvelopeKind};
use crate::cli::presentation::{
    format_decode_json, format_decode_text, format_features_json, format_features_text,
    format_simulation_json, format_simulation_text, DecodeSummary, SimulationResult,
};
use crate::cli::simulate::{StubFactory, TopFrameTransport};
use crate::config::{ConfigLoader, PagewireConfig};
use crate::error::CliError;
use crate::feature::{descriptors, StaticExclusionChecker};
use crate::frames::CrossFrameEnvelope;
use crate::guard::ManualRuntimeBinding;
use crate::messaging::MessageEnvelope;
use crate::page::{PageContext, PageServices};
use crate::types::FeatureKey;
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Runtime context for CLI execution: loaded configuration.
pub struct RunContext {
    config: PagewireConfig,
    config_path: Option<PathBuf>,
}

impl RunContext {
    /// Load and validate configuration. Uses ConfigLoader only.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, CliError> {
        let config = match config_path.as_deref() {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load()?,
        };
        if let Err(errors) = config.validate() {
            let reason = errors
                .iter()
                .map(|e| format!("  - {}", e))
                .collect::<Vec<_>>()
                .join("\n");
            return Err(CliError::InvalidConfig(reason));
        }
        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn config(&self) -> &PagewireConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, CliError> {
        let started = Instant::now();
        let result = match command {
            Commands::Features { format } => self.handle_features(format),
            Commands::Simulate {
                deny,
                fail,
                decline,
                format,
            } => self.handle_simulate(deny, fail, decline, format),
            Commands::Decode { kind, file, format } => {
                let raw = read_input(file.as_deref())?;
                self.handle_decode(*kind, &raw, format)
            }
        };
        debug!(
            command = command_name(command),
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    fn handle_features(&self, format: &str) -> Result<String, CliError> {
        let descriptors = descriptors();
        match format {
            "json" => format_features_json(&descriptors),
            _ => Ok(format_features_text(&descriptors)),
        }
    }

    fn handle_simulate(
        &self,
        deny: &[FeatureKey],
        fail: &[FeatureKey],
        decline: &[FeatureKey],
        format: &str,
    ) -> Result<String, CliError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CliError::Runtime(e.to_string()))?;

        let services = PageServices {
            binding: Arc::new(ManualRuntimeBinding::new("pagewire-simulate")),
            checker: Arc::new(StaticExclusionChecker::denying(deny.iter().copied())),
            factory: Arc::new(StubFactory::new(
                fail.iter().copied(),
                decline.iter().copied(),
            )),
            transport: Arc::new(TopFrameTransport),
            ui: None,
        };

        let result = runtime.block_on(async {
            let page = PageContext::new(services, &self.config);
            let report = page.start().await?;
            let status = page.features().status();
            let unhandled_actions = page
                .router()
                .missing_actions()
                .into_iter()
                .map(|action| action.to_string())
                .collect();
            let result = SimulationResult {
                frame_id: page.frames().frame_id().to_string(),
                report,
                status,
                unhandled_actions,
            };
            page.shutdown().await;
            Ok::<_, CliError>(result)
        })?;

        info!(
            active = result.status.active.len(),
            "Simulation complete"
        );
        match format {
            "json" => format_simulation_json(&result),
            _ => Ok(format_simulation_text(&result)),
        }
    }

    fn handle_decode(&self, kind: EnvelopeKind, raw: &str, format: &str) -> Result<String, CliError> {
        let summary = decode_envelope(kind, raw)?;
        match format {
            "json" => format_decode_json(&summary),
            _ => Ok(format_decode_text(&summary)),
        }
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Features { .. } => "features",
        Commands::Simulate { .. } => "simulate",
        Commands::Decode { .. } => "decode",
    }
}

fn read_input(file: Option<&Path>) -> Result<String, CliError> {
    match file {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

/// Validate `raw` the way a receiving context would.
fn decode_envelope(kind: EnvelopeKind, raw: &str) -> Result<DecodeSummary, CliError> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            return Ok(DecodeSummary::Rejected {
                reason: format!("not JSON: {}", err),
            })
        }
    };
    let summary = match kind {
        EnvelopeKind::Message => match MessageEnvelope::from_value(&value) {
            Err(err) => DecodeSummary::Rejected {
                reason: err.to_string(),
            },
            Ok(envelope) => match envelope.parsed_action() {
                Err(err) => DecodeSummary::Rejected {
                    reason: err.to_string(),
                },
                Ok(action) => DecodeSummary::Accepted {
                    kind: action.to_string(),
                    id: envelope.message_id.clone(),
                    detail: serde_json::to_string_pretty(&envelope.data)?,
                },
            },
        },
        EnvelopeKind::Frame => match CrossFrameEnvelope::from_value(&value)
            .and_then(|envelope| envelope.decode().map(|message| (envelope, message)))
        {
            Err(err) => DecodeSummary::Rejected {
                reason: err.to_string(),
            },
            Ok((envelope, message)) => DecodeSummary::Accepted {
                kind: message.kind().to_string(),
                id: envelope.frame_id.clone(),
                detail: format!("{:#?}", message),
            },
        },
    };
    Ok(summary)
}
