//! Source merging for engine configuration.

pub mod service;

use config::builder::DefaultState;
use config::ConfigBuilder;

/// Empty builder; defaults come from the serde attributes on `EngineConfig`.
pub(crate) fn builder_with_defaults() -> ConfigBuilder<DefaultState> {
    config::Config::builder()
}
