//! Single-document analysis: metadata and summary for one PDF.

use crate::config::PortalConfig;
use crate::error::{ErrorKind, Result};
use crate::loader::ModelLoader;
use crate::models::Metadata;
use crate::output::{AnalysisOutput, RunStats};
use crate::pipeline::ingest::DocumentHandler;
use crate::pipeline::llm::{invoke_structured, ChatModel};
use crate::pipeline::parse::JsonOutputParser;
use crate::pipeline::upload::UploadedFile;
use crate::progress::{ProgressCallback, Stage};
use crate::prompts::prompt;
use crate::session::SessionStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Asks the model for a document's [`Metadata`].
pub struct DocumentAnalyzer {
    model: Arc<dyn ChatModel>,
    progress: Option<ProgressCallback>,
}

impl DocumentAnalyzer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        info!("DocumentAnalyzer initialised with {}", model.label());
        Self {
            model,
            progress: None,
        }
    }

    /// Use the chat model selected by `loader`.
    pub fn from_loader(loader: &ModelLoader) -> Result<Self> {
        Ok(Self::new(loader.load_llm()?))
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Extract metadata and a summary from `document_text`.
    pub async fn analyze_document(&self, document_text: &str) -> Result<Metadata> {
        let parser = JsonOutputParser::<Metadata>::new();
        let instructions = parser.format_instructions();
        let metadata = invoke_structured(
            Arc::clone(&self.model),
            prompt("document_analysis")?,
            &[
                ("format_instructions", instructions.as_str()),
                ("document_text", document_text),
            ],
            parser,
            self.progress.as_ref(),
        )
        .await
        .inspect_err(|e| error!("Metadata analysis failed: {}", e))?;

        info!(
            "Metadata extraction successful: title={:?} pages={}",
            metadata.title, metadata.page_count
        );
        Ok(metadata)
    }
}

/// Analyse the PDF at `path` with the model selected by `config`.
///
/// Keys are checked before the file is stored or any call is made.
pub async fn analyze_file(path: impl AsRef<Path>, config: &PortalConfig) -> Result<AnalysisOutput> {
    let loader = ModelLoader::from_config(config.clone())?;
    let model = loader.load_llm()?;
    let upload = UploadedFile::from_path(path).await?;
    analyze_upload_with(model, &upload, config).await
}

/// Analyse `upload` in a fresh session using `model`.
pub async fn analyze_upload_with(
    model: Arc<dyn ChatModel>,
    upload: &UploadedFile,
    config: &PortalConfig,
) -> Result<AnalysisOutput> {
    analyze_upload_in_session(model, upload, config, None).await
}

/// Analyse `upload` inside `session_id`, or a fresh session when `None`.
pub async fn analyze_upload_in_session(
    model: Arc<dyn ChatModel>,
    upload: &UploadedFile,
    config: &PortalConfig,
    session_id: Option<&str>,
) -> Result<AnalysisOutput> {
    let total_start = Instant::now();
    let progress = config.progress_callback.as_ref();
    info!("Starting analysis: {}", upload.filename);

    // ── Step 1: Validate and store ───────────────────────────────────────
    upload.validate()?;
    let store = SessionStore::new(config.data.analyzer_root());
    let handler = DocumentHandler::new(&store, session_id)?;

    if let Some(cb) = progress {
        cb.on_stage_start(Stage::Save);
    }
    let save_start = Instant::now();
    let document_path = handler.save_data(upload).await?;
    if let Some(cb) = progress {
        cb.on_stage_complete(Stage::Save, save_start.elapsed().as_millis() as u64);
    }

    // ── Step 2: Extract text ─────────────────────────────────────────────
    if let Some(cb) = progress {
        cb.on_stage_start(Stage::Extract);
    }
    let extract_start = Instant::now();
    let document = handler.read_document(&document_path).await?;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    if let Some(cb) = progress {
        cb.on_stage_complete(Stage::Extract, extract_duration_ms);
    }
    if document.is_blank() {
        warn!(
            "{} has no extractable text; the model will see an empty document",
            upload.filename
        );
    }

    // ── Step 3: Ask the model ────────────────────────────────────────────
    let llm_start = Instant::now();
    let metadata = DocumentAnalyzer::new(model)
        .with_progress(config.progress_callback.clone())
        .analyze_document(&document.joined())
        .await?;
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    let stats = RunStats {
        total_pages: document.page_count(),
        extract_duration_ms,
        llm_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Analysis complete: session={} {}ms total",
        handler.session_id(),
        stats.total_duration_ms
    );

    Ok(AnalysisOutput {
        session_id: handler.session_id().clone(),
        document_path,
        page_count: document.page_count(),
        metadata,
        stats,
    })
}

/// Synchronous wrapper around [`analyze_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_file_sync(path: impl AsRef<Path>, config: &PortalConfig) -> Result<AnalysisOutput> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ErrorKind::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze_file(path, config))
}
