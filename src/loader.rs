//! Turns configuration and credentials into ready-to-use models.
//!
//! [`ModelLoader`] is the single place that decides which provider is active
//! and whether its key is present. Construction checks the key of the
//! selected chat provider, so a missing credential fails before any network
//! call is attempted.

use crate::config::PortalConfig;
use crate::embeddings::GeminiEmbeddings;
use crate::error::{ErrorKind, PortalError, Result};
use crate::keys::ApiKeyManager;
use crate::pipeline::llm::{ChatModel, EdgequakeChatModel};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Loads the chat model and the embedding model named by the configuration.
#[derive(Debug, Clone)]
pub struct ModelLoader {
    config: PortalConfig,
    keys: ApiKeyManager,
    provider: String,
}

impl ModelLoader {
    /// Load `.env`, discover the config file and read keys from the environment.
    pub fn new() -> Result<Self> {
        load_dotenv();
        let config = PortalConfig::discover(env_lookup)?;
        Self::with_lookup(config, env_lookup)
    }

    /// Use `config` as given, reading keys from `.env` and the environment.
    pub fn from_config(config: PortalConfig) -> Result<Self> {
        load_dotenv();
        Self::with_lookup(config, env_lookup)
    }

    /// Use `config` with keys and `LLM_PROVIDER` read through `lookup`.
    pub fn with_lookup(
        config: PortalConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let provider = config.selected_provider(&lookup);

        let mut names: Vec<&str> = config.llm.values().map(|s| s.api_key_env.as_str()).collect();
        names.push(config.embedding_model.api_key_env.as_str());
        names.sort_unstable();
        names.dedup();
        let keys = ApiKeyManager::load(names, &lookup);

        if let Some(settings) = config.llm_settings(&provider) {
            keys.require(&[settings.api_key_env.as_str()])?;
        } else {
            debug!("Provider '{}' has no llm entry; load_llm will fail", provider);
        }

        info!("Model loader ready: provider={}", provider);
        Ok(Self {
            config,
            keys,
            provider,
        })
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn keys(&self) -> &ApiKeyManager {
        &self.keys
    }

    /// Provider key selected for chat calls.
    pub fn selected_provider(&self) -> &str {
        &self.provider
    }

    /// Build the chat model for the selected provider.
    pub fn load_llm(&self) -> Result<Arc<dyn ChatModel>> {
        let settings = self.config.llm_settings(&self.provider).ok_or_else(|| {
            PortalError::new(ErrorKind::ProviderNotConfigured {
                provider: self.provider.clone(),
                hint: format!(
                    "Known providers: {}",
                    self.config.llm.keys().cloned().collect::<Vec<_>>().join(", ")
                ),
            })
        })?;
        self.keys.require(&[settings.api_key_env.as_str()])?;

        info!(
            "Loading LLM: provider={} model={}",
            settings.provider, settings.model_name
        );
        let model = EdgequakeChatModel::from_settings(
            settings,
            Duration::from_secs(self.config.api_timeout_secs),
        )?;
        Ok(Arc::new(model))
    }

    /// Build the embedding client.
    pub fn load_embeddings(&self) -> Result<GeminiEmbeddings> {
        let settings = &self.config.embedding_model;
        if settings.provider != "google" {
            Err(ErrorKind::ProviderNotConfigured {
                provider: settings.provider.clone(),
                hint: "Only the 'google' embedding provider is supported.".into(),
            })?;
        }
        self.keys.require(&[settings.api_key_env.as_str()])?;
        let key = self.keys.get(&settings.api_key_env)?;

        info!("Loading embedding model: {}", settings.model_name);
        GeminiEmbeddings::new(
            settings,
            key,
            Duration::from_secs(self.config.api_timeout_secs),
        )
    }
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => debug!("Ignoring unreadable .env: {}", e),
    }
}
