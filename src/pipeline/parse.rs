//! Parsing model replies into typed results, with one repair attempt.
//!
//! Chat models wrap JSON in Markdown fences, prefix it with chatter, or emit
//! `<think>` reasoning blocks first. [`JsonOutputParser`] strips those
//! deterministically before deserialising. When that still fails,
//! [`OutputFixingParser`] asks the model once to correct its own output.

use crate::error::{ErrorKind, PortalError, Result};
use crate::pipeline::llm::ChatModel;
use crate::progress::{ProgressCallback, Stage};
use crate::prompts::output_fixing_messages;
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const EXCERPT_CHARS: usize = 300;

static RE_THINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\s*\n(.*?)\n?```\s*$").unwrap());

/// Deserialises model output into `T` and describes `T` to the model.
pub struct JsonOutputParser<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for JsonOutputParser<T> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for JsonOutputParser<T> {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl<T> std::fmt::Debug for JsonOutputParser<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JsonOutputParser<{}>", std::any::type_name::<T>())
    }
}

impl<T: DeserializeOwned + JsonSchema> JsonOutputParser<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instructions embedding the JSON schema of `T`.
    pub fn format_instructions(&self) -> String {
        let schema = schemars::schema_for!(T);
        let schema = serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".into());
        format!(
            "The output should be formatted as a JSON instance that conforms to the JSON schema below.\n\
             Do not include any text outside the JSON.\n\n\
             ```json\n{schema}\n```"
        )
    }

    /// Parse `text` into `T`.
    pub fn parse(&self, text: &str) -> Result<T> {
        let cleaned = clean_output(text);

        let first_err = match serde_json::from_str::<T>(&cleaned) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if let Some(candidate) = outermost_json(&cleaned) {
            if candidate.len() != cleaned.len() {
                match serde_json::from_str::<T>(candidate) {
                    Ok(value) => {
                        debug!("Parsed JSON embedded in surrounding text");
                        return Ok(value);
                    }
                    Err(e) => {
                        return Err(PortalError::new(ErrorKind::OutputParse {
                            detail: e.to_string(),
                            excerpt: excerpt(text),
                        }))
                    }
                }
            }
        }

        Err(PortalError::new(ErrorKind::OutputParse {
            detail: first_err.to_string(),
            excerpt: excerpt(text),
        }))
    }
}

/// Wraps a [`JsonOutputParser`] and repairs unparsable output once via the model.
pub struct OutputFixingParser<T> {
    parser: JsonOutputParser<T>,
    model: Arc<dyn ChatModel>,
}

impl<T: DeserializeOwned + JsonSchema> OutputFixingParser<T> {
    pub fn new(parser: JsonOutputParser<T>, model: Arc<dyn ChatModel>) -> Self {
        Self { parser, model }
    }

    pub fn parser(&self) -> &JsonOutputParser<T> {
        &self.parser
    }

    /// Parse `completion`; on failure make exactly one repair call.
    pub async fn parse(&self, completion: &str, progress: Option<&ProgressCallback>) -> Result<T> {
        let err = match self.parser.parse(completion) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let reason = match err.kind() {
            ErrorKind::OutputParse { detail, .. } => detail.clone(),
            other => other.to_string(),
        };
        warn!(
            "Model output did not parse ({}); asking {} to repair it",
            reason,
            self.model.label()
        );
        if let Some(cb) = progress {
            cb.on_output_repair(&reason);
            cb.on_stage_start(Stage::Repair);
        }

        let start = Instant::now();
        let messages =
            output_fixing_messages(&self.parser.format_instructions(), completion, &reason);
        let repaired = self.model.invoke(&messages).await?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let value = self.parser.parse(&repaired).inspect_err(|e| {
            warn!("Repaired output still unparsable: {}", e);
        })?;
        info!("Model output repaired in {}ms", elapsed_ms);
        if let Some(cb) = progress {
            cb.on_stage_complete(Stage::Repair, elapsed_ms);
        }
        Ok(value)
    }
}

/// Remove reasoning blocks and outer Markdown fences.
pub fn clean_output(text: &str) -> String {
    let without_think = RE_THINK.replace_all(text, "");
    let trimmed = without_think.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].trim().to_string(),
        None => trimmed.to_string(),
    }
}

/// The first balanced `{...}` or `[...]` span, ignoring brackets inside strings.
pub fn outermost_json(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= EXCERPT_CHARS {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(EXCERPT_CHARS).collect();
        format!("{cut}…")
    }
}
