//! Session-scoped ingestion for the two portal flows.
//!
//! - [`DocumentHandler`]: one analysis session holding one uploaded PDF.
//! - [`ComparisonIngestion`]: one comparison session holding a reference and
//!   an actual PDF, combined into a single page-marked text for the model.

use crate::error::{ErrorKind, Result};
use crate::pipeline::extract::{extract_pdf, ExtractedDocument};
use crate::pipeline::upload::{is_pdf_name, UploadedFile};
use crate::session::{Session, SessionId, SessionStore};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Saves and reads the document of a single analysis session.
#[derive(Debug, Clone)]
pub struct DocumentHandler {
    session: Session,
}

impl DocumentHandler {
    /// Open `session_id` under `store`, or create a fresh session when `None`.
    pub fn new(store: &SessionStore, session_id: Option<&str>) -> Result<Self> {
        let session = store.open_or_create(session_id).inspect_err(|e| {
            error!("Failed to initialise analysis session: {}", e);
        })?;
        info!(
            "DocumentHandler ready: session={} path={}",
            session.id,
            session.path.display()
        );
        Ok(Self { session })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session.id
    }

    /// Validate `upload` and store it in the session directory.
    pub async fn save_data(&self, upload: &UploadedFile) -> Result<PathBuf> {
        upload.save_into(&self.session.path).await.inspect_err(|e| {
            error!("Error saving PDF '{}': {}", upload.filename, e);
        })
    }

    /// Extract the text of a stored PDF, pages joined by newlines.
    pub async fn read_data(&self, path: &Path) -> Result<String> {
        Ok(self.read_document(path).await?.joined())
    }

    /// Extract a stored PDF, keeping its pages separate.
    pub async fn read_document(&self, path: &Path) -> Result<ExtractedDocument> {
        let document = extract_pdf(path).await.inspect_err(|e| {
            error!("Error reading PDF '{}': {}", path.display(), e);
        })?;
        info!(
            "PDF read: session={} pages={}",
            self.session.id,
            document.page_count()
        );
        Ok(document)
    }
}

/// Stores the two documents of a comparison and merges them into one prompt input.
#[derive(Debug, Clone)]
pub struct ComparisonIngestion {
    store: SessionStore,
    session: Session,
    /// File name and role ("reference" or "actual") of each saved upload.
    roles: Vec<(String, &'static str)>,
}

impl ComparisonIngestion {
    /// Create a fresh comparison session under `store`.
    pub fn new(store: SessionStore) -> Result<Self> {
        let session = store.create().inspect_err(|e| {
            error!("Failed to initialise comparison session: {}", e);
        })?;
        info!(
            "ComparisonIngestion ready: session={} path={}",
            session.id,
            session.path.display()
        );
        Ok(Self {
            store,
            session,
            roles: Vec::new(),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Validate and store the reference and actual documents.
    ///
    /// Both uploads are validated before either touches the disk.
    pub async fn save_uploaded_files(
        &mut self,
        reference: &UploadedFile,
        actual: &UploadedFile,
    ) -> Result<(PathBuf, PathBuf)> {
        reference.validate()?;
        actual.validate()?;
        if reference.filename == actual.filename {
            Err(ErrorKind::DuplicateUpload {
                filename: reference.filename.clone(),
            })?;
        }

        let ref_path = reference.save_into(&self.session.path).await?;
        let act_path = actual.save_into(&self.session.path).await?;
        self.roles = vec![
            (reference.filename.clone(), "reference"),
            (actual.filename.clone(), "actual"),
        ];
        info!(
            "Files saved: reference={} actual={} session={}",
            ref_path.display(),
            act_path.display(),
            self.session.id
        );
        Ok((ref_path, act_path))
    }

    /// Concatenate every PDF in the session, in name order.
    ///
    /// Each document contributes `"Document: <name>\n<page-marked text>"`;
    /// documents are separated by a blank line. Files saved through
    /// [`save_uploaded_files`](Self::save_uploaded_files) get their role
    /// appended to the header, e.g. `"Document: v1.pdf (reference)"`.
    pub async fn combine_documents(&self) -> Result<String> {
        let pdfs = self.session_pdfs()?;
        if pdfs.is_empty() {
            Err(ErrorKind::NoDocuments {
                detail: format!("no PDF files in {}", self.session.path.display()),
            })?;
        }

        let mut parts = Vec::with_capacity(pdfs.len());
        for (name, path) in &pdfs {
            let document = extract_pdf(path).await.inspect_err(|e| {
                error!("Error combining '{}': {}", name, e);
            })?;
            if document.is_blank() {
                warn!("{} yielded no text; it will contribute only its header", name);
            }
            let header = match self.role_of(name) {
                Some(role) => format!("Document: {} ({})", name, role),
                None => format!("Document: {}", name),
            };
            parts.push(format!("{}\n{}", header, document.with_page_markers()));
        }

        let combined = parts.join("\n\n");
        info!(
            "Documents combined: count={} session={}",
            parts.len(),
            self.session.id
        );
        Ok(combined)
    }

    /// Remove all but the `keep_latest` most recent comparison sessions.
    ///
    /// This ingestion's own session is always kept and counts toward
    /// `keep_latest`.
    pub fn clean_old_sessions(&self, keep_latest: usize) -> Result<Vec<SessionId>> {
        self.store
            .clean_old_sessions_except(keep_latest, &self.session.id)
    }

    fn role_of(&self, name: &str) -> Option<&'static str> {
        self.roles
            .iter()
            .find(|(saved, _)| saved == name)
            .map(|(_, role)| *role)
    }

    fn session_pdfs(&self) -> Result<Vec<(String, PathBuf)>> {
        let dir = &self.session.path;
        let mut pdfs = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| ErrorKind::io(dir, e))? {
            let entry = entry.map_err(|e| ErrorKind::io(dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if is_pdf_name(name) {
                pdfs.push((name.to_string(), path.clone()));
            }
        }
        pdfs.sort();
        Ok(pdfs)
    }
}
