//! Environment source: PAGEWIRE__SECTION__KEY, e.g.
//! PAGEWIRE__ORCHESTRATOR__DEBOUNCE_MS=250 or
//! PAGEWIRE__ORCHESTRATOR__WATCHED_SETTINGS=A,B.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

pub const ENV_PREFIX: &str = "PAGEWIRE";

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("orchestrator.watched_settings"),
    )
}
