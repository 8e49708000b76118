//! # edgequake-docportal
//!
//! Analyse and compare PDF documents with a hosted LLM.
//!
//! The portal takes uploaded PDFs, extracts their text and asks a chat model
//! for structured JSON: metadata and a summary for one document, or a
//! page-by-page list of differences between two. Replies that do not parse
//! are repaired once by a second call before an error is returned.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF upload
//!  │
//!  ├─ 1. Save     validate name + magic bytes, write into a session dir
//!  ├─ 2. Extract  page text via lopdf (CPU-bound, spawn_blocking)
//!  ├─ 3. Prompt   substitute text + JSON schema into a template
//!  ├─ 4. Invoke   one chat call through edgequake-llm
//!  └─ 5. Parse    typed JSON, with a single repair call on failure
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docportal::{analyze_file, PortalConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider from LLM_PROVIDER (default: google, key in GEMINI_API_KEY)
//!     let config = PortalConfig::discover(|k| std::env::var(k).ok())?;
//!     let output = analyze_file("report.pdf", &config).await?;
//!     println!("{}", output.metadata.title);
//!     for line in &output.metadata.summary {
//!         println!("- {line}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docportal` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-docportal = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod compare;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod keys;
pub mod loader;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze_file, analyze_file_sync, analyze_upload_with, DocumentAnalyzer};
pub use compare::{compare_files, compare_files_sync, compare_uploads_with, DocumentComparator};
pub use config::{PortalConfig, PortalConfigBuilder};
pub use embeddings::GeminiEmbeddings;
pub use error::{ErrorKind, PortalError};
pub use keys::ApiKeyManager;
pub use loader::ModelLoader;
pub use models::{ChangeFormat, ComparisonReport, Metadata, PageCount};
pub use output::{AnalysisOutput, ComparisonOutput, RunStats};
pub use pipeline::extract::{extract_pdf, inspect_pdf, DocumentInfo, ExtractedDocument};
pub use pipeline::llm::{ChatModel, EdgequakeChatModel};
pub use pipeline::upload::UploadedFile;
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback, Stage};
pub use session::{Session, SessionId, SessionStore};
