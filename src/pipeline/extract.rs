//! PDF text extraction via `lopdf`.
//!
//! ## Why spawn_blocking?
//!
//! Parsing a PDF and decoding its content streams is CPU-bound and can take
//! hundreds of milliseconds on a large report. `tokio::task::spawn_blocking`
//! keeps that work off the async worker threads.
//!
//! The text of every page is kept separately in [`ExtractedDocument`]. The
//! analyzer and the comparator join pages differently.

use crate::error::{ErrorKind, PortalError, Result};
use lopdf::Document;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Page text pulled out of one PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    /// Text of each page, in page order. Blank pages are kept as empty strings.
    pub pages: Vec<String>,
}

impl ExtractedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// True if no page yielded any non-whitespace text (e.g. scanned PDFs).
    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|p| p.trim().is_empty())
    }

    /// All pages joined with a newline. Used as analysis input.
    pub fn joined(&self) -> String {
        self.pages.join("\n")
    }

    /// Non-blank pages prefixed with a `--- Page N ---` marker (1-indexed).
    ///
    /// Used as comparison input so the model can cite page numbers.
    pub fn with_page_markers(&self) -> String {
        self.pages
            .iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(idx, text)| format!("\n --- Page {} --- \n{}", idx + 1, text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Structural facts about a PDF, available without any API key.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub page_count: usize,
    pub pdf_version: String,
    pub is_encrypted: bool,
}

/// Extract the text of every page of the PDF at `path`.
pub async fn extract_pdf(path: &Path) -> Result<ExtractedDocument> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || extract_pdf_blocking(&path))
        .await
        .map_err(|e| ErrorKind::Internal(format!("Extraction task panicked: {}", e)))?
}

/// Read page count, version and encryption flag.
pub async fn inspect_pdf(path: &Path) -> Result<DocumentInfo> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let document = load_document(&path)?;
        Ok(DocumentInfo {
            page_count: document.get_pages().len(),
            pdf_version: document.version.clone(),
            is_encrypted: document.is_encrypted(),
            path,
        })
    })
    .await
    .map_err(|e| ErrorKind::Internal(format!("Inspect task panicked: {}", e)))?
}

/// Blocking implementation of [`extract_pdf`].
pub fn extract_pdf_blocking(path: &Path) -> Result<ExtractedDocument> {
    let document = load_document(path)?;
    ensure_readable(&document, path)?;
    let extracted = extract_from_document(&document, path)?;
    info!(
        "PDF read: {} ({} pages)",
        path.display(),
        extracted.page_count()
    );
    Ok(extracted)
}

/// Extract page text from an in-memory PDF. `label` names it in errors.
pub fn extract_pdf_bytes(bytes: &[u8], label: &str) -> Result<ExtractedDocument> {
    let path = PathBuf::from(label);
    let document = Document::load_mem(bytes).map_err(|e| classify_load_error(&path, e))?;
    ensure_readable(&document, &path)?;
    extract_from_document(&document, &path)
}

fn load_document(path: &Path) -> Result<Document> {
    if !path.exists() {
        Err(ErrorKind::FileNotFound {
            path: path.to_path_buf(),
        })?;
    }
    Document::load(path).map_err(|e| classify_load_error(path, e))
}

/// lopdf decrypts on load when the user password is empty and records the
/// state; the `Encrypt` entry stays in the trailer either way.
fn ensure_readable(document: &Document, path: &Path) -> Result<()> {
    if document.is_encrypted() && document.encryption_state.is_none() {
        return Err(PortalError::new(ErrorKind::EncryptedPdf {
            path: path.to_path_buf(),
        }));
    }
    if document.encryption_state.is_some() {
        debug!("{} decrypted with the empty user password", path.display());
    }
    Ok(())
}

#[track_caller]
fn classify_load_error(path: &Path, err: lopdf::Error) -> PortalError {
    let detail = err.to_string();
    let lower = detail.to_lowercase();
    if lower.contains("decrypt") || lower.contains("password") || lower.contains("encrypt") {
        PortalError::new(ErrorKind::EncryptedPdf {
            path: path.to_path_buf(),
        })
    } else {
        PortalError::new(ErrorKind::CorruptPdf {
            path: path.to_path_buf(),
            detail,
        })
    }
}

fn extract_from_document(document: &Document, path: &Path) -> Result<ExtractedDocument> {
    let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    let mut pages = Vec::with_capacity(page_numbers.len());

    for page_num in page_numbers {
        match document.extract_text(&[page_num]) {
            Ok(text) => {
                debug!("Page {}: {} chars", page_num, text.len());
                pages.push(text);
            }
            Err(e) => {
                // One undecodable content stream should not sink the document.
                warn!(
                    "Page {} of {}: text extraction failed: {}",
                    page_num,
                    path.display(),
                    e
                );
                pages.push(String::new());
            }
        }
    }

    if pages.is_empty() {
        Err(ErrorKind::CorruptPdf {
            path: path.to_path_buf(),
            detail: "document has no pages".into(),
        })?;
    }

    let extracted = ExtractedDocument { pages };
    if extracted.is_blank() {
        warn!(
            "{} contains no extractable text (scanned or image-only PDF?)",
            path.display()
        );
    }
    Ok(extracted)
}
