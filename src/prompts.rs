//! Prompt templates for document analysis and comparison.
//!
//! All prompts live in [`PROMPT_REGISTRY`] so changing the portal's
//! instructions means editing exactly one file, and tests can inspect the
//! templates without a model.
//!
//! Templates use `{name}` placeholders. [`PromptTemplate::render`] fills them
//! in one left-to-right pass: substituted text is never scanned again, so a
//! document containing `{` or a JSON schema in the format instructions is
//! passed through untouched.

use crate::error::{ErrorKind, Result};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

/// Who a prompt message is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One rendered chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A named chat prompt with `{placeholder}` variables.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub name: &'static str,
    pub messages: Vec<(Role, &'static str)>,
}

impl PromptTemplate {
    /// Placeholder names in order of first appearance.
    pub fn variables(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for (_, text) in &self.messages {
            for name in placeholders(*text) {
                if !seen.contains(&name) {
                    seen.push(name);
                }
            }
        }
        seen
    }

    /// Substitute `vars` into every message.
    pub fn render(&self, vars: &[(&str, &str)]) -> Result<Vec<PromptMessage>> {
        self.messages
            .iter()
            .map(|(role, text)| {
                Ok(PromptMessage {
                    role: *role,
                    content: substitute(self.name, text, vars)?,
                })
            })
            .collect()
    }
}

/// Analysis prompt. Variables: `format_instructions`, `document_text`.
pub const DOCUMENT_ANALYSIS_PROMPT: &str = "You are a highly capable assistant trained to analyze and summarize documents.
Return ONLY valid JSON matching the exact schema below.

{format_instructions}

Analyze this document:
{document_text}";

/// Comparison system message. Variable: `format_instruction`.
pub const DOCUMENT_COMPARISON_SYSTEM: &str = "You will be provided with content from two PDFs. Your tasks are as follows:

1. Compare the content in two PDFs
2. Identify the difference in PDF and note down the page number
3. The output you provide must be page wise comparison content
4. If any page do not have any change, mention as 'NO CHANGE'
5. The document marked (reference) is the baseline; describe how the document marked (actual) differs from it

Input documents:

{combined_docs}

Your response should follow this format:

{format_instruction}";

/// Registry of every named prompt.
pub static PROMPT_REGISTRY: Lazy<HashMap<&'static str, PromptTemplate>> = Lazy::new(|| {
    let mut registry = HashMap::new();
    registry.insert(
        "document_analysis",
        PromptTemplate {
            name: "document_analysis",
            messages: vec![(Role::User, DOCUMENT_ANALYSIS_PROMPT)],
        },
    );
    registry.insert(
        "document_comparison",
        PromptTemplate {
            name: "document_comparison",
            messages: vec![(Role::System, DOCUMENT_COMPARISON_SYSTEM)],
        },
    );
    registry
});

/// Look up a prompt by name.
pub fn prompt(name: &str) -> Result<&'static PromptTemplate> {
    PROMPT_REGISTRY.get(name).ok_or_else(|| {
        ErrorKind::Internal(format!("no prompt named '{name}' in the registry")).into()
    })
}

/// Build the repair request sent when the primary output failed to parse.
pub fn output_fixing_messages(
    instructions: &str,
    completion: &str,
    error: &str,
) -> Vec<PromptMessage> {
    vec![PromptMessage::user(format!(
        "Instructions:\n--------------\n{instructions}\n--------------\n\
         Completion:\n--------------\n{completion}\n--------------\n\n\
         Above, the Completion did not satisfy the constraints given in the Instructions.\n\
         Error:\n--------------\n{error}\n--------------\n\n\
         Please try again. Please only respond with an answer that satisfies the \
         constraints laid out in the Instructions:"
    ))]
}

fn placeholders(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || loop {
        let open = rest.find('{')?;
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_ident(&after[..close]) => {
                rest = &after[close + 1..];
                return Some(&after[..close]);
            }
            _ => rest = after,
        }
    })
}

fn substitute(prompt: &str, text: &str, vars: &[(&str, &str)]) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_ident(&after[..close]) => {
                let name = &after[..close];
                let value = vars
                    .iter()
                    .find(|(k, _)| *k == name)
                    .map(|(_, v)| *v)
                    .ok_or_else(|| ErrorKind::MissingPromptVariable {
                        prompt: prompt.to_string(),
                        variable: name.to_string(),
                    })?;
                out.push_str(value);
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
