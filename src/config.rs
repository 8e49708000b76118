//! Configuration types for the document portal.
//!
//! Everything the portal needs to know lives in one [`PortalConfig`]: which
//! LLM providers exist and how to call them, which embedding model to use,
//! where session directories go on disk, and how long to wait for a model.
//!
//! The on-disk form is YAML (`config/config.yaml`):
//!
//! ```yaml
//! default_provider: google
//! llm:
//!   google:
//!     provider: google
//!     model_name: gemini-2.0-flash
//!     temperature: 0.0
//!     max_output_tokens: 2048
//!     api_key_env: GEMINI_API_KEY
//! embedding_model:
//!   provider: google
//!   model_name: models/text-embedding-004
//!   api_key_env: GEMINI_API_KEY
//! data:
//!   root: data
//!   keep_latest: 3
//! ```
//!
//! Runtime overrides (CLI flags, tests) go through [`PortalConfigBuilder`].

use crate::error::{ErrorKind, Result};
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Relative location of the config file under `BASE_PATH` or the cwd.
pub const CONFIG_RELATIVE_PATH: &str = "config/config.yaml";

/// Environment variable selecting the LLM provider key.
pub const PROVIDER_ENV: &str = "LLM_PROVIDER";

/// Environment variable pointing at the project root holding `config/`.
pub const BASE_PATH_ENV: &str = "BASE_PATH";

/// Configuration for the document portal.
///
/// Loaded with [`PortalConfig::load`] / [`PortalConfig::discover`], or built
/// in code via [`PortalConfig::builder()`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Provider key used when neither an override nor `LLM_PROVIDER` is set.
    pub default_provider: String,

    /// Chat model settings keyed by provider key (`google`, `groq`, …).
    pub llm: BTreeMap<String, LlmSettings>,

    /// Embedding model settings.
    pub embedding_model: EmbeddingSettings,

    /// Session directory layout.
    pub data: DataSettings,

    /// Per-LLM-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Provider key forced at runtime; beats `LLM_PROVIDER` and the default.
    #[serde(skip)]
    pub provider_override: Option<String>,

    /// Optional pipeline progress observer.
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

/// Settings for one chat provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Backend name understood by the provider factory (`google`, `groq`, `openai`, …).
    pub provider: String,

    /// Model identifier, e.g. `gemini-2.0-flash`.
    pub model_name: String,

    /// Sampling temperature. Clamped to 0.0–2.0.
    #[serde(default)]
    pub temperature: f32,

    /// Maximum tokens the model may generate per call.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: usize,

    /// Environment variable holding this provider's API key.
    pub api_key_env: String,
}

fn default_max_output_tokens() -> usize {
    2048
}

/// Settings for the embedding model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: String,
    pub model_name: String,
    pub api_key_env: String,
    /// REST base URL. Overridable for proxies and tests.
    pub base_url: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "google".into(),
            model_name: "models/text-embedding-004".into(),
            api_key_env: "GEMINI_API_KEY".into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
        }
    }
}

/// Where uploaded documents are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Root directory for all sessions. Default: `data`.
    pub root: PathBuf,
    /// Sub-directory for single-document analysis sessions.
    pub analyzer_dir: String,
    /// Sub-directory for comparison sessions.
    pub compare_dir: String,
    /// How many comparison sessions survive a cleanup sweep. Default: 3.
    pub keep_latest: usize,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            analyzer_dir: "analyzer_docs".into(),
            compare_dir: "document_compare".into(),
            keep_latest: 3,
        }
    }
}

impl DataSettings {
    /// Directory holding analysis sessions.
    pub fn analyzer_root(&self) -> PathBuf {
        self.root.join(&self.analyzer_dir)
    }

    /// Directory holding comparison sessions.
    pub fn compare_root(&self) -> PathBuf {
        self.root.join(&self.compare_dir)
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        let mut llm = BTreeMap::new();
        llm.insert(
            "google".to_string(),
            LlmSettings {
                provider: "google".into(),
                model_name: "gemini-2.0-flash".into(),
                temperature: 0.0,
                max_output_tokens: 2048,
                api_key_env: "GEMINI_API_KEY".into(),
            },
        );
        llm.insert(
            "groq".to_string(),
            LlmSettings {
                provider: "groq".into(),
                model_name: "deepseek-r1-distill-llama-70b".into(),
                temperature: 0.0,
                max_output_tokens: 2048,
                api_key_env: "GROQ_API_KEY".into(),
            },
        );
        Self {
            default_provider: "google".into(),
            llm,
            embedding_model: EmbeddingSettings::default(),
            data: DataSettings::default(),
            api_timeout_secs: 60,
            provider_override: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PortalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalConfig")
            .field("default_provider", &self.default_provider)
            .field("llm", &self.llm)
            .field("embedding_model", &self.embedding_model)
            .field("data", &self.data)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("provider_override", &self.provider_override)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl PortalConfig {
    /// Create a new builder starting from the built-in defaults.
    pub fn builder() -> PortalConfigBuilder {
        PortalConfigBuilder {
            config: Self::default(),
        }
    }

    /// Turn an existing config into a builder for further overrides.
    pub fn into_builder(self) -> PortalConfigBuilder {
        PortalConfigBuilder { config: self }
    }

    /// Parse a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: Self =
            serde_yml::from_str(yaml).map_err(|e| ErrorKind::InvalidConfig(e.to_string()))?;
        config.clamp_temperatures();
        config.validate()?;
        Ok(config)
    }

    /// Load and validate the YAML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ErrorKind::ConfigLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let mut config: Self = serde_yml::from_str(&raw).map_err(|e| ErrorKind::ConfigLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        config.clamp_temperatures();
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Locate the config file and load it.
    ///
    /// Search order: `$BASE_PATH/config/config.yaml`, then
    /// `./config/config.yaml`, then built-in defaults.
    pub fn discover(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(base) = lookup(BASE_PATH_ENV).filter(|b| !b.is_empty()) {
            return Self::load(Path::new(&base).join(CONFIG_RELATIVE_PATH));
        }
        let local = Path::new(CONFIG_RELATIVE_PATH);
        if local.is_file() {
            return Self::load(local);
        }
        debug!("No config file found; using built-in defaults");
        Ok(Self::default())
    }

    /// Resolve which provider key to use.
    ///
    /// Explicit override wins, then `LLM_PROVIDER`, then `default_provider`.
    pub fn selected_provider(&self, lookup: impl Fn(&str) -> Option<String>) -> String {
        if let Some(ref name) = self.provider_override {
            return name.clone();
        }
        lookup(PROVIDER_ENV)
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.default_provider.clone())
    }

    /// Settings for `provider`, if configured.
    pub fn llm_settings(&self, provider: &str) -> Option<&LlmSettings> {
        self.llm.get(provider)
    }

    fn clamp_temperatures(&mut self) {
        for (name, settings) in self.llm.iter_mut() {
            let clamped = settings.temperature.clamp(0.0, 2.0);
            if clamped != settings.temperature && !settings.temperature.is_nan() {
                warn!(
                    "llm.{}.temperature {} out of range; using {}",
                    name, settings.temperature, clamped
                );
                settings.temperature = clamped;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.llm.is_empty() {
            Err(ErrorKind::InvalidConfig("at least one `llm` provider is required".into()))?;
        }
        if !self.llm.contains_key(&self.default_provider) {
            Err(ErrorKind::InvalidConfig(format!(
                "default_provider '{}' has no entry under `llm` (available: {})",
                self.default_provider,
                self.llm.keys().cloned().collect::<Vec<_>>().join(", ")
            )))?;
        }
        for (name, settings) in &self.llm {
            if settings.model_name.trim().is_empty() {
                Err(ErrorKind::InvalidConfig(format!(
                    "llm.{name}.model_name must not be empty"
                )))?;
            }
            if !(0.0..=2.0).contains(&settings.temperature) {
                Err(ErrorKind::InvalidConfig(format!(
                    "llm.{name}.temperature must be 0.0–2.0, got {}",
                    settings.temperature
                )))?;
            }
        }
        if self.api_timeout_secs == 0 {
            Err(ErrorKind::InvalidConfig("api_timeout_secs must be ≥ 1".into()))?;
        }
        Ok(())
    }
}

/// Builder for [`PortalConfig`].
#[derive(Debug)]
pub struct PortalConfigBuilder {
    config: PortalConfig,
}

impl PortalConfigBuilder {
    pub fn provider(mut self, name: impl Into<String>) -> Self {
        self.config.provider_override = Some(name.into());
        self
    }

    pub fn default_provider(mut self, name: impl Into<String>) -> Self {
        self.config.default_provider = name.into();
        self
    }

    pub fn llm(mut self, name: impl Into<String>, mut settings: LlmSettings) -> Self {
        settings.temperature = settings.temperature.clamp(0.0, 2.0);
        self.config.llm.insert(name.into(), settings);
        self
    }

    pub fn embedding_model(mut self, settings: EmbeddingSettings) -> Self {
        self.config.embedding_model = settings;
        self
    }

    pub fn data_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.data.root = root.into();
        self
    }

    pub fn keep_latest(mut self, n: usize) -> Self {
        self.config.data.keep_latest = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PortalConfig> {
        if let Some(ref name) = self.config.provider_override {
            if !self.config.llm.contains_key(name) {
                Err(ErrorKind::ProviderNotConfigured {
                    provider: name.clone(),
                    hint: format!(
                        "Known providers: {}",
                        self.config.llm.keys().cloned().collect::<Vec<_>>().join(", ")
                    ),
                })?;
            }
        }
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn shipped_yaml_parses() {
        let cfg = PortalConfig::from_yaml(include_str!("../config/config.yaml"))
            .expect("shipped config must be valid");
        assert_eq!(cfg.default_provider, "google");
        assert!(cfg.llm.contains_key("google"));
        assert!(cfg.llm.contains_key("groq"));
        assert_eq!(cfg.data.keep_latest, 3);
        assert_eq!(cfg.embedding_model.model_name, "models/text-embedding-004");
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = PortalConfig::builder().build().expect("defaults valid");
        assert_eq!(cfg.api_timeout_secs, 60);
        assert_eq!(cfg.data.analyzer_root(), PathBuf::from("data/analyzer_docs"));
        assert_eq!(cfg.data.compare_root(), PathBuf::from("data/document_compare"));
    }

    #[test]
    fn provider_selection_order() {
        let cfg = PortalConfig::default();
        assert_eq!(cfg.selected_provider(lookup_from(&[])), "google");
        assert_eq!(
            cfg.selected_provider(lookup_from(&[("LLM_PROVIDER", "groq")])),
            "groq"
        );
        let forced = PortalConfig::builder().provider("google").build().unwrap();
        assert_eq!(
            forced.selected_provider(lookup_from(&[("LLM_PROVIDER", "groq")])),
            "google"
        );
    }

    #[test]
    fn unknown_override_is_rejected() {
        let err = PortalConfig::builder().provider("nope").build().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ProviderNotConfigured { provider, .. } if provider == "nope"));
    }

    #[test]
    fn unknown_default_provider_is_rejected() {
        let yaml = "default_provider: missing\nllm:\n  google:\n    provider: google\n    model_name: m\n    api_key_env: K\n";
        let err = PortalConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidConfig(_)));
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "llm:\n  google:\n    provider: google\n    model_name: gemini-2.0-flash\n    api_key_env: GEMINI_API_KEY\n";
        let cfg = PortalConfig::from_yaml(yaml).unwrap();
        assert_eq!(cfg.data.keep_latest, 3);
        assert_eq!(cfg.llm["google"].max_output_tokens, 2048);
        assert_eq!(cfg.llm.len(), 1);
    }

    #[test]
    fn builder_clamps_temperature() {
        let cfg = PortalConfig::builder()
            .llm(
                "hot",
                LlmSettings {
                    provider: "openai".into(),
                    model_name: "gpt-4.1-nano".into(),
                    temperature: 9.0,
                    max_output_tokens: 100,
                    api_key_env: "OPENAI_API_KEY".into(),
                },
            )
            .build()
            .unwrap();
        assert_eq!(cfg.llm["hot"].temperature, 2.0);
    }

    #[test]
    fn yaml_temperature_is_clamped() {
        let cfg = PortalConfig::from_yaml(
            "default_provider: groq\nllm:\n  groq:\n    provider: groq\n    model_name: llama\n    temperature: 3.5\n    api_key_env: GROQ_API_KEY\n",
        )
        .unwrap();
        assert_eq!(cfg.llm["groq"].temperature, 2.0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "default_provider: groq\nllm:\n  groq:\n    provider: groq\n    model_name: llama\n    temperature: -1.0\n    api_key_env: GROQ_API_KEY\n",
        )
        .unwrap();
        assert_eq!(PortalConfig::load(&path).unwrap().llm["groq"].temperature, 0.0);
    }

    #[test]
    fn discover_honours_base_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(
            dir.path().join(CONFIG_RELATIVE_PATH),
            "default_provider: groq\nllm:\n  groq:\n    provider: groq\n    model_name: llama\n    api_key_env: GROQ_API_KEY\n",
        )
        .unwrap();
        let base = dir.path().to_string_lossy().to_string();
        let cfg = PortalConfig::discover(lookup_from(&[("BASE_PATH", base.as_str())])).unwrap();
        assert_eq!(cfg.default_provider, "groq");
    }

    #[test]
    fn missing_file_under_base_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();
        let err = PortalConfig::discover(lookup_from(&[("BASE_PATH", base.as_str())])).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ConfigLoad { .. }));
    }
}
