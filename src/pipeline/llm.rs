//! Chat-model calls: the only pipeline stage with network I/O.
//!
//! [`ChatModel`] is the seam between the portal and a hosted LLM. Production
//! code uses [`EdgequakeChatModel`], which drives any `edgequake_llm`
//! provider. Tests plug in scripted implementations.
//!
//! There is no retry/backoff here. A failed call fails the request; the only
//! second call the portal ever makes is the output repair in
//! [`crate::pipeline::parse::OutputFixingParser`].

use crate::config::LlmSettings;
use crate::error::{ErrorKind, Result};
use crate::pipeline::parse::{JsonOutputParser, OutputFixingParser};
use crate::progress::{ProgressCallback, Stage};
use crate::prompts::{PromptMessage, PromptTemplate, Role};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// A chat-completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Short `provider/model` label used in logs and errors.
    fn label(&self) -> &str;

    /// Send `messages` and return the reply text.
    async fn invoke(&self, messages: &[PromptMessage]) -> Result<String>;
}

/// [`ChatModel`] backed by an `edgequake_llm` provider.
pub struct EdgequakeChatModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
    options: CompletionOptions,
    timeout: Duration,
}

impl std::fmt::Debug for EdgequakeChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgequakeChatModel")
            .field("label", &self.label)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl EdgequakeChatModel {
    /// Build a provider from `settings` through the edgequake factory.
    ///
    /// The factory reads the provider's API key from the environment.
    pub fn from_settings(settings: &LlmSettings, timeout: Duration) -> Result<Self> {
        let factory_name = factory_provider_name(&settings.provider);
        let provider = ProviderFactory::create_llm_provider(factory_name, &settings.model_name)
            .map_err(|e| ErrorKind::ProviderNotConfigured {
                provider: settings.provider.clone(),
                hint: format!(
                    "Could not create provider '{}' with model '{}': {}\n\
                     Check that {} is set.",
                    factory_name, settings.model_name, e, settings.api_key_env
                ),
            })?;
        Ok(Self::from_provider(provider, settings, timeout))
    }

    /// Wrap an already constructed provider.
    pub fn from_provider(
        provider: Arc<dyn LLMProvider>,
        settings: &LlmSettings,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            label: format!("{}/{}", settings.provider, settings.model_name),
            options: build_options(settings),
            timeout,
        }
    }
}

#[async_trait]
impl ChatModel for EdgequakeChatModel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn invoke(&self, messages: &[PromptMessage]) -> Result<String> {
        let chat: Vec<ChatMessage> = messages.iter().map(to_chat_message).collect();
        let start = Instant::now();

        let response = tokio::time::timeout(
            self.timeout,
            self.provider.chat(&chat, Some(&self.options)),
        )
        .await
        .map_err(|_| {
            error!("{}: no reply within {:?}", self.label, self.timeout);
            ErrorKind::ApiTimeout {
                provider: self.label.clone(),
                secs: self.timeout.as_secs(),
            }
        })?
        .map_err(|e| {
            error!("{}: API call failed: {}", self.label, e);
            ErrorKind::LlmApiError {
                provider: self.label.clone(),
                message: e.to_string(),
            }
        })?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.label,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

/// Render `template`, call `model`, and parse the reply into `T`.
///
/// Unparsable output gets one repair call through [`OutputFixingParser`].
pub async fn invoke_structured<T>(
    model: Arc<dyn ChatModel>,
    template: &PromptTemplate,
    vars: &[(&str, &str)],
    parser: JsonOutputParser<T>,
    progress: Option<&ProgressCallback>,
) -> Result<T>
where
    T: DeserializeOwned + JsonSchema,
{
    let messages = template.render(vars)?;

    if let Some(cb) = progress {
        cb.on_stage_start(Stage::Invoke);
    }
    let start = Instant::now();
    let reply = model.invoke(&messages).await?;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    if let Some(cb) = progress {
        cb.on_stage_complete(Stage::Invoke, elapsed_ms);
    }
    info!(
        "{} answered '{}' in {}ms ({} chars)",
        model.label(),
        template.name,
        elapsed_ms,
        reply.len()
    );

    OutputFixingParser::new(parser, model)
        .parse(&reply, progress)
        .await
}

/// Map a configured provider key to the edgequake factory name.
pub fn factory_provider_name(provider: &str) -> &str {
    match provider {
        "google" | "google_genai" => "gemini",
        other => other,
    }
}

fn to_chat_message(message: &PromptMessage) -> ChatMessage {
    match message.role {
        Role::System => ChatMessage::system(message.content.as_str()),
        Role::User => ChatMessage::user(message.content.as_str()),
    }
}

fn build_options(settings: &LlmSettings) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(settings.temperature),
        max_tokens: Some(settings.max_output_tokens),
        ..Default::default()
    }
}
