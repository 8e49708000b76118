//! Page-wise comparison of a reference PDF against an actual PDF.

use crate::config::PortalConfig;
use crate::error::{ErrorKind, Result};
use crate::loader::ModelLoader;
use crate::models::ComparisonReport;
use crate::output::{ComparisonOutput, RunStats};
use crate::pipeline::ingest::ComparisonIngestion;
use crate::pipeline::llm::{invoke_structured, ChatModel};
use crate::pipeline::parse::JsonOutputParser;
use crate::pipeline::upload::UploadedFile;
use crate::progress::{ProgressCallback, Stage};
use crate::prompts::prompt;
use crate::session::SessionStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Asks the model for the differences between two combined documents.
pub struct DocumentComparator {
    model: Arc<dyn ChatModel>,
    progress: Option<ProgressCallback>,
}

impl DocumentComparator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        info!("DocumentComparator initialised with {}", model.label());
        Self {
            model,
            progress: None,
        }
    }

    pub fn from_loader(loader: &ModelLoader) -> Result<Self> {
        Ok(Self::new(loader.load_llm()?))
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Compare the documents in `combined_docs`, as produced by
    /// [`ComparisonIngestion::combine_documents`].
    pub async fn compare_documents(&self, combined_docs: &str) -> Result<ComparisonReport> {
        if combined_docs.trim().is_empty() {
            Err(ErrorKind::NoDocuments {
                detail: "combined document text is empty".into(),
            })?;
        }

        let parser = JsonOutputParser::<ComparisonReport>::new();
        let instructions = parser.format_instructions();
        let report = invoke_structured(
            Arc::clone(&self.model),
            prompt("document_comparison")?,
            &[
                ("combined_docs", combined_docs),
                ("format_instruction", instructions.as_str()),
            ],
            parser,
            self.progress.as_ref(),
        )
        .await
        .inspect_err(|e| error!("Error comparing documents: {}", e))?;

        info!(
            "Document comparison completed: {} rows, {} with changes",
            report.rows().len(),
            report.changed_pages().count()
        );
        Ok(report)
    }
}

/// Compare two PDFs on disk with the model selected by `config`.
pub async fn compare_files(
    reference: impl AsRef<Path>,
    actual: impl AsRef<Path>,
    config: &PortalConfig,
) -> Result<ComparisonOutput> {
    let loader = ModelLoader::from_config(config.clone())?;
    let model = loader.load_llm()?;
    let reference = UploadedFile::from_path(reference).await?;
    let actual = UploadedFile::from_path(actual).await?;
    compare_uploads_with(model, &reference, &actual, config).await
}

/// Compare `reference` against `actual` in a fresh session using `model`.
///
/// After the documents are combined, older comparison sessions beyond
/// `config.data.keep_latest` are removed.
pub async fn compare_uploads_with(
    model: Arc<dyn ChatModel>,
    reference: &UploadedFile,
    actual: &UploadedFile,
    config: &PortalConfig,
) -> Result<ComparisonOutput> {
    let total_start = Instant::now();
    let progress = config.progress_callback.as_ref();
    info!(
        "Starting comparison: {} vs {}",
        reference.filename, actual.filename
    );

    reference.validate()?;
    actual.validate()?;
    let mut ingestion = ComparisonIngestion::new(SessionStore::new(config.data.compare_root()))?;

    // ── Step 1: Store both documents ─────────────────────────────────────
    if let Some(cb) = progress {
        cb.on_stage_start(Stage::Save);
    }
    let save_start = Instant::now();
    let (reference_path, actual_path) = ingestion.save_uploaded_files(reference, actual).await?;
    if let Some(cb) = progress {
        cb.on_stage_complete(Stage::Save, save_start.elapsed().as_millis() as u64);
    }

    // ── Step 2: Combine their text ───────────────────────────────────────
    if let Some(cb) = progress {
        cb.on_stage_start(Stage::Extract);
    }
    let extract_start = Instant::now();
    let combined = ingestion.combine_documents().await?;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    if let Some(cb) = progress {
        cb.on_stage_complete(Stage::Extract, extract_duration_ms);
    }
    let total_pages = combined.matches(" --- Page ").count();

    // ── Step 3: Sweep old sessions ───────────────────────────────────────
    let removed_sessions = ingestion.clean_old_sessions(config.data.keep_latest)?;

    // ── Step 4: Ask the model ────────────────────────────────────────────
    let llm_start = Instant::now();
    let report = DocumentComparator::new(model)
        .with_progress(config.progress_callback.clone())
        .compare_documents(&combined)
        .await?;
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    let stats = RunStats {
        total_pages,
        extract_duration_ms,
        llm_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Comparison complete: session={} {}ms total",
        ingestion.session().id,
        stats.total_duration_ms
    );

    Ok(ComparisonOutput {
        session_id: ingestion.session().id.clone(),
        reference_path,
        actual_path,
        report,
        removed_sessions,
        stats,
    })
}

/// Synchronous wrapper around [`compare_files`].
///
/// Creates a temporary tokio runtime internally.
pub fn compare_files_sync(
    reference: impl AsRef<Path>,
    actual: impl AsRef<Path>,
    config: &PortalConfig,
) -> Result<ComparisonOutput> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ErrorKind::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(compare_files(reference, actual, config))
}
