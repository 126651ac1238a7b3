//! CLI parse: clap types for pagewire. No behavior; definitions only.

use crate::types::FeatureKey;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// pagewire - page feature orchestration diagnostics
#[derive(Parser)]
#[command(name = "pagewire")]
#[command(about = "Inspect the feature catalog, simulate page startup and validate wire envelopes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List features in activation order with their policy and dependencies
    Features {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Start a page context with in-memory features and report what activated
    Simulate {
        /// Feature the exclusion oracle rejects (repeatable)
        #[arg(long = "deny")]
        deny: Vec<FeatureKey>,
        /// Feature whose activation fails (repeatable)
        #[arg(long = "fail")]
        fail: Vec<FeatureKey>,
        /// Feature whose handler declines activation (repeatable)
        #[arg(long = "decline")]
        decline: Vec<FeatureKey>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Validate a wire envelope read from a file or stdin
    Decode {
        /// Envelope kind
        #[arg(value_enum)]
        kind: EnvelopeKind,
        /// Read from this file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EnvelopeKind {
    /// Cross-context command envelope
    Message,
    /// Frame-to-frame coordination envelope
    Frame,
}
