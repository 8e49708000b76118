//! Upload validation and persistence.
//!
//! An [`UploadedFile`] is a file name plus a byte buffer, which is what a
//! web form or the CLI hands us. Before anything touches the disk we check
//! three things, in order:
//!
//! 1. the name is a bare file name (no `/`, `\`, `.` or `..`);
//! 2. the extension is `.pdf` (case-insensitive);
//! 3. the bytes start with the `%PDF` magic.
//!
//! Saving writes to a temporary sibling and renames it into place, so a
//! crash never leaves a half-written PDF in a session directory.

use crate::error::{ErrorKind, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A document handed to the portal for analysis or comparison.
#[derive(Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedFile")
            .field("filename", &self.filename)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a local file as if it had been uploaded under its own name.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ErrorKind::InvalidFileName {
                filename: path.display().to_string(),
            })?
            .to_string();

        let bytes = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ErrorKind::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ErrorKind::io(path, e)
            }
        })?;

        debug!("Read upload {} ({} bytes)", filename, bytes.len());
        Ok(Self { filename, bytes })
    }

    /// True when the file name ends in `.pdf`, ignoring case.
    pub fn has_pdf_extension(&self) -> bool {
        is_pdf_name(&self.filename)
    }

    /// Validate name, extension and magic bytes.
    pub fn validate(&self) -> Result<()> {
        let name = self.filename.as_str();
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
            || name.contains('\0')
        {
            Err(ErrorKind::InvalidFileName {
                filename: name.to_string(),
            })?;
        }

        if !self.has_pdf_extension() {
            Err(ErrorKind::InvalidFileType {
                filename: name.to_string(),
            })?;
        }

        if !self.bytes.starts_with(PDF_MAGIC) {
            Err(ErrorKind::NotAPdf {
                filename: name.to_string(),
                magic: self.bytes.iter().take(4).copied().collect(),
            })?;
        }

        Ok(())
    }

    /// Validate, then atomically write into `dir`. Returns the final path.
    pub async fn save_into(&self, dir: &Path) -> Result<PathBuf> {
        self.validate()?;

        let path = dir.join(&self.filename);
        let tmp_path = dir.join(format!(".{}.tmp", self.filename));

        tokio::fs::write(&tmp_path, &self.bytes)
            .await
            .map_err(|e| ErrorKind::io(&tmp_path, e))?;

        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| ErrorKind::io(&path, e))?;

        info!("Document saved: {}", path.display());
        Ok(path)
    }
}

/// True when `name` ends in `.pdf`, ignoring case.
pub fn is_pdf_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
