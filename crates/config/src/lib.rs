mod engine;
mod error;
mod llm;
mod loader;

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

pub use engine::{EngineConfig, FallbackConfig};
pub use error::Error;
pub use llm::{BackendKind, ChannelConfig, ModelConfig, ModelProviderConfig};

pub(crate) type Result<T> = std::result::Result<T, error::Error>;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub channels: IndexMap<String, ChannelConfig>,
    #[serde(default)]
    pub models: IndexMap<String, ModelConfig>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }
}
