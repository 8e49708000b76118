//! Structured results returned by the model.
//!
//! Field names follow the JSON the prompts ask for (PascalCase), so the
//! schemas embedded in the format instructions and the serde derives agree.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Metadata and summary extracted from one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub struct Metadata {
    /// Short summary of the document, one entry per point.
    #[serde(default)]
    pub summary: Vec<String>,
    pub title: String,
    pub author: Vec<String>,
    pub date_created: String,
    pub last_modified_date: String,
    pub publisher: String,
    pub language: String,
    pub page_count: PageCount,
    pub sentiment_tone: String,
}

/// Page count as reported by the model: a number, or a marker such as
/// `"Not Available"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum PageCount {
    Count(u64),
    Text(String),
}

impl Default for PageCount {
    fn default() -> Self {
        PageCount::Text("Not Available".into())
    }
}

impl fmt::Display for PageCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageCount::Count(n) => write!(f, "{n}"),
            PageCount::Text(s) => f.write_str(s),
        }
    }
}

/// Changes found on one page of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChangeFormat {
    /// Page number the change refers to.
    #[serde(rename = "Page", deserialize_with = "string_or_number")]
    #[schemars(with = "String")]
    pub page: String,
    /// Description of the changes, or `NO CHANGE`.
    #[serde(rename = "Changes")]
    pub changes: String,
}

/// Page-wise comparison of two documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ComparisonReport(pub Vec<ChangeFormat>);

impl ComparisonReport {
    pub fn rows(&self) -> &[ChangeFormat] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pages whose changes are not `NO CHANGE`.
    pub fn changed_pages(&self) -> impl Iterator<Item = &ChangeFormat> {
        self.0
            .iter()
            .filter(|row| !row.changes.trim().eq_ignore_ascii_case("no change"))
    }

    /// Render as a two-column plain-text table.
    pub fn to_table(&self) -> String {
        let page_width = self
            .0
            .iter()
            .map(|r| r.page.chars().count())
            .max()
            .unwrap_or(0)
            .max("Page".len());

        let mut out = format!("{:<page_width$} | Changes\n", "Page");
        out.push_str(&format!("{}-+-{}\n", "-".repeat(page_width), "-".repeat(7)));
        for row in &self.0 {
            let mut lines = row.changes.lines();
            let first = lines.next().unwrap_or("");
            out.push_str(&format!("{:<page_width$} | {}\n", row.page, first));
            for line in lines {
                out.push_str(&format!("{:<page_width$} | {}\n", "", line));
            }
        }
        out
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(f) => f.to_string(),
    })
}
