//! Shared services built once per process and injected downwards.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::ResponseCache;
use crate::client::{ChatClient, OpenAiClient};
use crate::config::{AnalysisConfig, ConfigError};
use crate::domain::Result;
use crate::pipeline::AnalysisPipeline;

/// Chat client and response cache for one configuration.
#[derive(Clone)]
pub struct Services {
    config: AnalysisConfig,
    client: Arc<dyn ChatClient>,
    cache: Arc<ResponseCache>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("backend", &self.client.backend())
            .field("model", &self.config.model)
            .field("cache_entries", &self.cache.len())
            .finish()
    }
}

impl Services {
    /// Build the OpenAI-backed client. Fails without an API key.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        if !config.has_api_key() {
            return Err(ConfigError::InvalidValue {
                field: "api_key".to_string(),
                reason: "set OPENAI_API_KEY or api_key in .insights/secrets.toml".to_string(),
            }
            .into());
        }
        let client = OpenAiClient::new(
            config.api_base_url.as_str(),
            config.api_key.as_str(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::with_client(config.clone(), Arc::new(client)))
    }

    /// Use an existing client (tests, alternative backends).
    pub fn with_client(config: AnalysisConfig, client: Arc<dyn ChatClient>) -> Self {
        let cache = Arc::new(ResponseCache::new(
            config.cache_capacity,
            Duration::from_secs(config.cache_ttl_secs),
        ));
        Self {
            config,
            client,
            cache,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn client(&self) -> Arc<dyn ChatClient> {
        Arc::clone(&self.client)
    }

    pub fn cache(&self) -> Arc<ResponseCache> {
        Arc::clone(&self.cache)
    }

    /// Pipeline sharing this client and cache.
    pub fn pipeline(&self) -> AnalysisPipeline {
        AnalysisPipeline::new(self.config.clone(), self.client()).with_cache(self.cache())
    }
}
