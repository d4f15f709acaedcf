//! Read-only view of the model and channel configuration.

use std::collections::BTreeMap;

use config::{BackendKind, ChannelConfig, Config, ModelConfig, ModelProviderConfig};
use secrecy::SecretString;
use url::Url;

/// A backend endpoint eligible to serve a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    pub id: String,
    pub kind: BackendKind,
    pub channel: Option<String>,
    pub rewrite: Option<String>,
    pub priority: i32,
    pub reasoning: bool,
}

impl Provider {
    /// The channel this provider dispatches through.
    pub fn channel_id(&self) -> &str {
        self.channel.as_deref().unwrap_or(&self.id)
    }
}

impl From<&ModelProviderConfig> for Provider {
    fn from(config: &ModelProviderConfig) -> Self {
        Self {
            id: config.id.clone(),
            kind: config.kind,
            channel: config.channel.clone(),
            rewrite: config.rewrite.clone(),
            priority: config.priority,
            reasoning: config.reasoning,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelMetadata {
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_context: Option<usize>,
    pub search_results: Option<usize>,
    pub restricted: bool,
}

impl From<&ModelConfig> for ModelMetadata {
    fn from(config: &ModelConfig) -> Self {
        Self {
            system_prompt: config.system_prompt.clone(),
            temperature: config.temperature,
            max_context: config.max_context,
            search_results: config.search_results,
            restricted: config.restricted,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelEntry {
    pub providers: Vec<Provider>,
    pub metadata: ModelMetadata,
}

/// Credentials and transport settings for one upstream endpoint.
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: String,
    pub kind: BackendKind,
    pub server: Option<Url>,
    pub secret: Option<SecretString>,
    pub backup: Option<String>,
    pub meta: BTreeMap<String, String>,
}

impl Channel {
    pub fn from_config(id: &str, config: &ChannelConfig) -> Self {
        Self {
            id: id.to_string(),
            kind: config.kind,
            server: config.server.clone(),
            secret: config.secret.clone(),
            backup: config.backup.clone(),
            meta: config.meta.clone(),
        }
    }

    /// A meta value parsed into `T`, ignoring values that do not parse.
    pub fn meta_value<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.meta.get(key)?;

        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("Ignoring unparsable meta value '{key}' = '{raw}' on channel '{}'", self.id);
                None
            }
        }
    }
}

/// Provider used for models without configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackModel {
    pub provider: String,
    pub kind: BackendKind,
    pub max_context: usize,
}

/// The configuration collaborator consulted on every request.
///
/// Implementations return snapshots; the engine never mutates them and tolerates
/// a channel disappearing between resolution and dispatch.
pub trait ModelCatalog: Send + Sync {
    fn lookup_model(&self, model: &str) -> Option<ModelEntry>;

    fn lookup_channel(&self, channel: &str) -> Option<Channel>;

    fn fallback(&self) -> FallbackModel;
}

/// Catalog backed by a loaded configuration file.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    config: Config,
}

impl StaticCatalog {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ModelCatalog for StaticCatalog {
    fn lookup_model(&self, model: &str) -> Option<ModelEntry> {
        let config = self.config.models.get(model)?;

        Some(ModelEntry {
            providers: config.providers.iter().map(Provider::from).collect(),
            metadata: ModelMetadata::from(config),
        })
    }

    fn lookup_channel(&self, channel: &str) -> Option<Channel> {
        self.config
            .channels
            .get(channel)
            .map(|config| Channel::from_config(channel, config))
    }

    fn fallback(&self) -> FallbackModel {
        FallbackModel {
            provider: self.config.fallback.provider.clone(),
            kind: self.config.fallback.kind,
            max_context: self.config.fallback.max_context,
        }
    }
}
