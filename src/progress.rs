//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PortalConfigBuilder::progress_callback`] to observe the
//! portal as it saves, extracts, invokes the model and (when needed) repairs
//! the model's output. The CLI drives its spinner from these events.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docportal::{PipelineProgressCallback, PortalConfig, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     repairs: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_output_repair(&self, error: &str) {
//!         self.repairs.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("repairing model output: {error}");
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { repairs: AtomicUsize::new(0) });
//! let config = PortalConfig::builder()
//!     .progress_callback(cb as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// One step of the portal pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Writing uploaded PDFs into the session directory.
    Save,
    /// Reading page text out of the PDFs.
    Extract,
    /// Primary LLM call.
    Invoke,
    /// Secondary LLM call repairing unparsable output.
    Repair,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Save => "saving",
            Stage::Extract => "extracting text",
            Stage::Invoke => "calling model",
            Stage::Repair => "repairing output",
        };
        f.write_str(s)
    }
}

/// Called by the pipeline as it moves through each [`Stage`].
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage finishes successfully.
    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called when the primary model output failed to parse and a repair
    /// call is about to be made.
    fn on_output_repair(&self, error: &str) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PortalConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
