//! Text embeddings through the Gemini `embedContent` REST endpoint.

use crate::config::EmbeddingSettings;
use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Embedding client for Google's generative-language API.
#[derive(Clone)]
pub struct GeminiEmbeddings {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for GeminiEmbeddings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiEmbeddings")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Option<Embedding>,
}

#[derive(Deserialize)]
struct Embedding {
    values: Vec<f32>,
}

impl GeminiEmbeddings {
    pub fn new(settings: &EmbeddingSettings, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ErrorKind::Embedding {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        let model = if settings.model_name.starts_with("models/") {
            settings.model_name.clone()
        } else {
            format!("models/{}", settings.model_name)
        };
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model,
            api_key: api_key.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed a single query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/{}:embedContent", self.base_url, self.model);
        let body = EmbedRequest {
            model: &self.model,
            content: Content {
                parts: [Part { text }],
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Embedding request to {} failed: {}", self.model, e);
                ErrorKind::Embedding {
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!("Embedding API returned {}: {}", status, detail);
            return Err(ErrorKind::Embedding {
                message: format!("HTTP {status}: {detail}"),
            }
            .into());
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| ErrorKind::Embedding {
            message: format!("invalid response body: {e}"),
        })?;
        let values = parsed
            .embedding
            .map(|e| e.values)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ErrorKind::Embedding {
                message: "response has no embedding values".into(),
            })?;

        debug!("Embedded {} chars into {} dimensions", text.len(), values.len());
        Ok(values)
    }

    /// Embed each text in turn, one request per text.
    pub async fn embed_documents<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_query(text.as_ref()).await?);
        }
        Ok(out)
    }
}
