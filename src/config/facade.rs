//! Config loader facade: assembles sources in precedence order and
//! deserializes the merged result.

use super::merge::merge_policy;
use super::sources::{environment, explicit_file, global_file};
use super::PagewireConfig;
use config::ConfigError;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from defaults, the global config file and the environment.
    pub fn load() -> Result<PagewireConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = environment::add_to_builder(builder);
        let config: PagewireConfig = builder.build()?.try_deserialize()?;
        debug!(
            debounce_ms = config.orchestrator.debounce_ms,
            watched = config.orchestrator.watched_settings.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load with an explicit file layered over the global one. The explicit
    /// file must exist.
    pub fn load_from_file(path: &Path) -> Result<PagewireConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = explicit_file::add_to_builder(builder, path)?;
        let builder = environment::add_to_builder(builder);
        let config: PagewireConfig = builder.build()?.try_deserialize()?;
        debug!(config_path = %path.display(), "Configuration loaded from file");
        Ok(config)
    }

    /// Where the global config file is looked up.
    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
