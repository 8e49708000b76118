//! Error types for the edgequake-docportal library.
//!
//! Every failure in the portal surfaces as one type, [`PortalError`]. It
//! pairs an [`ErrorKind`] (what went wrong) with the source location where
//! the error was raised, so a log line or CLI message points straight at the
//! failing call site.
//!
//! The location is captured through `#[track_caller]` on the
//! `From<ErrorKind>` conversion. Code therefore raises errors with plain `?`:
//!
//! ```rust
//! use edgequake_docportal::error::{ErrorKind, PortalError};
//!
//! fn check(name: &str) -> Result<(), PortalError> {
//!     if !name.ends_with(".pdf") {
//!         Err(ErrorKind::InvalidFileType { filename: name.to_string() })?;
//!     }
//!     Ok(())
//! }
//!
//! let err = check("notes.txt").unwrap_err();
//! assert!(err.to_string().contains("notes.txt"));
//! assert!(err.location().file().ends_with(".rs"));
//! ```

use std::fmt;
use std::panic::Location;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = PortalError> = std::result::Result<T, E>;

/// The single application error returned by every fallible portal operation.
pub struct PortalError {
    kind: ErrorKind,
    location: &'static Location<'static>,
}

impl PortalError {
    /// Wrap `kind`, recording the caller's location.
    #[track_caller]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            location: Location::caller(),
        }
    }

    /// What went wrong.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Consume the error and return its kind.
    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }

    /// Source file and line where the error was raised.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }
}

impl From<ErrorKind> for PortalError {
    #[track_caller]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for PortalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}:{}]",
            self.kind,
            self.location.file(),
            self.location.line()
        )
    }
}

impl fmt::Debug for PortalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalError")
            .field("kind", &self.kind)
            .field("file", &self.location.file())
            .field("line", &self.location.line())
            .finish()
    }
}

impl std::error::Error for PortalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.kind)
    }
}

/// Everything that can go wrong in the portal pipeline.
#[derive(Debug, Error)]
pub enum ErrorKind {
    // ── Upload errors ─────────────────────────────────────────────────────
    /// Uploaded file does not carry a `.pdf` extension.
    #[error("Invalid file type '{filename}'. Only PDFs are allowed.")]
    InvalidFileType { filename: String },

    /// Uploaded file name is empty or contains path components.
    #[error("Invalid file name '{filename}': expected a bare file name")]
    InvalidFileName { filename: String },

    /// File carries a `.pdf` name but the bytes are not a PDF.
    #[error("'{filename}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { filename: String, magic: Vec<u8> },

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Both sides of a comparison use the same file name.
    #[error("Reference and actual documents share the name '{filename}'; rename one of them")]
    DuplicateUpload { filename: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF is encrypted; text cannot be extracted.
    #[error("PDF '{path}' is encrypted and cannot be read")]
    EncryptedPdf { path: PathBuf },

    /// PDF structure could not be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    // ── Session errors ────────────────────────────────────────────────────
    /// No session directory exists for this id.
    #[error("Session '{id}' does not exist under '{root}'")]
    SessionNotFound { id: String, root: PathBuf },

    /// Session id is not of the form `session_YYYYMMDD_HHMMSS_xxxxxxxx`.
    #[error("Invalid session id '{id}'")]
    InvalidSessionId { id: String },

    /// Nothing to work on: no PDFs in the session, or the text is blank.
    #[error("No documents to process: {detail}")]
    NoDocuments { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or file validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The YAML configuration file could not be read or parsed.
    #[error("Failed to load config '{path}': {detail}")]
    ConfigLoad { path: PathBuf, detail: String },

    /// Required API keys are absent from the environment.
    #[error("Missing required API keys: {}", .keys.join(", "))]
    MissingApiKeys { keys: Vec<String> },

    /// The selected provider is unknown or could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The LLM API returned an error.
    #[error("LLM API error from '{provider}': {message}")]
    LlmApiError { provider: String, message: String },

    /// The LLM call did not return within the configured timeout.
    #[error("LLM call to '{provider}' timed out after {secs}s")]
    ApiTimeout { provider: String, secs: u64 },

    /// Embedding request failed.
    #[error("Embedding request failed: {message}")]
    Embedding { message: String },

    // ── Prompt/output errors ──────────────────────────────────────────────
    /// A prompt placeholder had no value.
    #[error("Prompt '{prompt}' is missing variable '{variable}'")]
    MissingPromptVariable { prompt: String, variable: String },

    /// Model output could not be parsed, even after the repair call.
    #[error("Could not parse model output: {detail}\nOutput: {excerpt}")]
    OutputParse { detail: String, excerpt: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Filesystem operation failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ErrorKind {
    /// Shorthand for an [`ErrorKind::Io`] tied to `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ErrorKind::Io {
            path: path.into(),
            source,
        }
    }
}
